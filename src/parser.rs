use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1, take_while1},
    character::complete,
    combinator::{all_consuming, map, map_res, opt, recognize, value, verify},
    error::{context, convert_error, VerboseError, VerboseErrorKind},
    multi::{many0, many0_count, many1},
    sequence::{delimited, pair, preceded, separated_pair},
    Err, Finish, IResult,
};
use parse_hyperlinks::take_until_unbalanced;

use crate::{
    expression::{PatternItem, TypeSpec, Variable},
    semantic_error::SemanticError,
    utils::IntRange,
};

type Res<T, U> = IResult<T, U, VerboseError<T>>;

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn identifier(input: &str) -> Res<&str, &str> {
    recognize(pair(
        alt((complete::alpha1, tag("_"))),
        many0_count(alt((complete::alphanumeric1, tag("_"), tag("-")))),
    ))(input)
}

fn count(input: &str) -> Res<&str, usize> {
    map_res(complete::digit1, |digits: &str| digits.parse::<usize>())(input)
}

fn quantifier(input: &str) -> Res<&str, IntRange> {
    context(
        "quantifier",
        alt((
            value(IntRange::OPTIONAL, complete::char('?')),
            value(IntRange::PLUS, complete::char('+')),
            value(IntRange::STAR, complete::char('*')),
            map(
                separated_pair(
                    count,
                    delimited(complete::space0, complete::char('-'), complete::space0),
                    count,
                ),
                |(lower, upper)| IntRange::new(lower, upper),
            ),
            map(count, IntRange::exactly),
        )),
    )(input)
}

fn parse_delimited_node(
    input: &str,
    opening_bracket: char,
    closing_bracket: char,
) -> Res<&str, &str> {
    let result = delimited(
        complete::char(opening_bracket),
        take_until_unbalanced(opening_bracket, closing_bracket),
        complete::char(closing_bracket),
    )(input);
    match result {
        Ok((input, inner)) => Ok((input, inner)),
        Err(_) => Err(Err::Error(VerboseError {
            errors: vec![(
                input,
                VerboseErrorKind::Context("Incomplete delimited node"),
            )],
        })),
    }
}

/// `keyword<inner>`, blanks allowed around the angle brackets.
fn angled<'a, O>(
    keyword: &'static str,
    inner: impl FnMut(&'a str) -> Res<&'a str, O>,
) -> impl FnMut(&'a str) -> Res<&'a str, O> {
    preceded(
        pair(tag(keyword), complete::space0),
        delimited(
            pair(complete::char('<'), complete::space0),
            inner,
            pair(complete::space0, complete::char('>')),
        ),
    )
}

fn list_type(input: &str) -> Res<&str, TypeSpec> {
    map(angled("list", identifier), |entry| {
        TypeSpec::List(entry.to_string())
    })(input)
}

fn tuple_type(input: &str) -> Res<&str, TypeSpec> {
    let names = many1(preceded(
        delimited(complete::space0, complete::char(','), complete::space0),
        identifier,
    ));
    map(angled("tuple", pair(identifier, names)), |(entry, names)| {
        TypeSpec::Tuple {
            entry: entry.to_string(),
            names: names.into_iter().map(str::to_string).collect(),
        }
    })(input)
}

fn bracketed(input: &str) -> Res<&str, &str> {
    parse_delimited_node(input, '[', ']')
}

fn character_class(input: &str) -> Res<&str, TypeSpec> {
    map(recognize(bracketed), |class: &str| {
        TypeSpec::CharacterClass(class.to_string())
    })(input)
}

fn type_spec(input: &str) -> Res<&str, TypeSpec> {
    context(
        "type",
        alt((
            list_type,
            tuple_type,
            character_class,
            map(identifier, |name| TypeSpec::Named(name.to_string())),
        )),
    )(input)
}

fn variable_body(input: &str) -> Res<&str, Variable> {
    let (input, name) = take_while1(|c: char| !matches!(c, ':' | '{' | '}'))(input)?;
    let (input, ty) = opt(preceded(complete::char(':'), type_spec))(input)?;
    let (input, quantifier) = opt(preceded(complete::char(':'), quantifier))(input)?;
    Ok((
        input,
        Variable {
            name: name.to_string(),
            ty,
            quantifier,
        },
    ))
}

fn variable(input: &str) -> Res<&str, PatternItem> {
    let (input, inner) = parse_delimited_node(input, '{', '}')?;
    let (_, variable) = context("variable", all_consuming(variable_body))(inner)?;
    Ok((input, PatternItem::Variable(variable)))
}

fn literal(input: &str) -> Res<&str, PatternItem> {
    let (_, text) = verify(take_till1(|c: char| c == '{' || c == '\n'), |text: &str| {
        !text.starts_with(is_blank)
    })(input)?;
    let (text, rest) = input.split_at(text.trim_end_matches(is_blank).len());
    Ok((rest, PatternItem::Literal(text.to_string())))
}

fn item(input: &str) -> Res<&str, PatternItem> {
    alt((variable, literal))(input)
}

fn pattern(input: &str) -> Res<&str, Vec<PatternItem>> {
    let (input, (first, rest)) = delimited(
        complete::space0,
        pair(item, many0(pair(complete::space0, item))),
        complete::space0,
    )(input)?;
    let mut items = vec![first];
    for (blanks, item) in rest {
        if !blanks.is_empty() {
            items.push(PatternItem::Whitespace);
        }
        items.push(item);
    }
    Ok((input, items))
}

/// Splits a sentence pattern like `Now it is {t:time}.` into its items.
pub(crate) fn parse_pattern(input: &str) -> Result<Vec<PatternItem>, SemanticError> {
    all_consuming(pattern)(input)
        .finish()
        .map(|(_, items)| items)
        .map_err(|e| SemanticError::InvalidPattern(convert_error(input, e)))
}

#[cfg(test)]
mod test {
    use insta::assert_snapshot;

    use super::*;

    fn items(pattern: &str) -> String {
        parse_pattern(pattern)
            .unwrap()
            .iter()
            .map(|item| format!("{item:?}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn single_variable(pattern: &str) -> Variable {
        match parse_pattern(pattern).unwrap().as_slice() {
            [PatternItem::Variable(variable)] => variable.clone(),
            other => panic!("expected a single variable, got {other:?}"),
        }
    }

    #[test]
    fn sentence() {
        assert_snapshot!(items("Now it is only {p:percentage}."), @r###"
        Literal("Now it is only")
        Whitespace
        Variable(Variable { name: "p", ty: Some(Named("percentage")), quantifier: None })
        Literal(".")
        "###);
    }

    #[test]
    fn adjacent_items_have_no_whitespace() {
        assert_snapshot!(items("{d:digit:+}.  {<led-power>:int}%"), @r###"
        Variable(Variable { name: "d", ty: Some(Named("digit")), quantifier: Some(IntRange { lower: 1, upper: 2147483647 }) })
        Literal(".")
        Whitespace
        Variable(Variable { name: "<led-power>", ty: Some(Named("int")), quantifier: None })
        Literal("%")
        "###);
    }

    #[test]
    fn untyped_variable() {
        let variable = single_variable("{From frame}");
        assert_eq!(variable.name, "From frame");
        assert_eq!(variable.ty, None);
        assert_eq!(variable.quantifier, None);
    }

    #[test]
    fn quantifiers() {
        let quantifier = |pattern| single_variable(pattern).quantifier;
        assert_eq!(quantifier("{d:digit:?}"), Some(IntRange::OPTIONAL));
        assert_eq!(quantifier("{d:digit:*}"), Some(IntRange::STAR));
        assert_eq!(quantifier("{d:digit:2}"), Some(IntRange::exactly(2)));
        assert_eq!(quantifier("{d:digit:1 - 3}"), Some(IntRange::new(1, 3)));
        // without a type the quantifier follows the name directly
        let variable = single_variable("{d:2}");
        assert_eq!(variable.ty, None);
        assert_eq!(variable.quantifier, Some(IntRange::exactly(2)));
    }

    #[test]
    fn composite_types() {
        assert_eq!(
            single_variable("{xs:list< int >:1-2}"),
            Variable {
                name: "xs".to_string(),
                ty: Some(TypeSpec::List("int".to_string())),
                quantifier: Some(IntRange::new(1, 2)),
            }
        );
        assert_eq!(
            single_variable("{c:tuple<int, red,green , blue>}").ty,
            Some(TypeSpec::Tuple {
                entry: "int".to_string(),
                names: vec!["red".to_string(), "green".to_string(), "blue".to_string()],
            })
        );
        assert_eq!(
            single_variable("{c:[a-zA-Z0-9]:2}").ty,
            Some(TypeSpec::CharacterClass("[a-zA-Z0-9]".to_string()))
        );
        assert_eq!(
            single_variable("{c:[^\\]]}").ty,
            Some(TypeSpec::CharacterClass("[^\\]]".to_string()))
        );
    }

    #[test]
    fn identifiers_may_contain_hyphens() {
        assert_eq!(
            single_variable("{r:integer-range}").ty,
            Some(TypeSpec::Named("integer-range".to_string()))
        );
    }

    #[test]
    fn outer_blanks_are_ignored() {
        assert_eq!(
            parse_pattern("  385nm \t").unwrap(),
            vec![PatternItem::Literal("385nm".to_string())]
        );
    }

    #[test]
    fn invalid_patterns() {
        for pattern in ["", "   ", "{unclosed", "a\nb", "{x:int:?x}", "{x:int:}"] {
            assert!(
                matches!(parse_pattern(pattern), Err(SemanticError::InvalidPattern(_))),
                "{pattern:?} should be rejected"
            );
        }
    }
}
