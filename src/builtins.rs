//! Types every [`Language`](crate::language::Language) knows from the start.
use crate::{
    autocompletion::IfNothingYetEntered,
    evaluator::{self, expect_int, EvaluationError, Value},
    grammar::Grammar,
    node::NodeRef,
    rule::Join,
    symbol::{Nameable, Terminal},
    utils::IntRange,
};

pub const DIGIT: &str = "digit";
pub const LETTER: &str = "letter";
pub const SIGN: &str = "sign";
pub const INTEGER: &str = "int";
pub const FLOAT: &str = "float";
pub const WHITESPACE_STAR: &str = "whitespace-star";
pub const WHITESPACE_PLUS: &str = "whitespace-plus";
pub const INTEGER_RANGE: &str = "integer-range";
pub const TIME: &str = "time";
pub const MONTH: &str = "month";
pub const COLOR: &str = "color";
pub const LINEBREAK_STAR: &str = "linebreak-star";

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const COLORS: [(&str, i64, i64, i64); 15] = [
    ("black", 0, 0, 0),
    ("white", 255, 255, 255),
    ("red", 255, 0, 0),
    ("orange", 255, 128, 0),
    ("yellow", 255, 255, 0),
    ("lawn green", 128, 255, 0),
    ("green", 0, 255, 0),
    ("spring green", 0, 255, 180),
    ("cyan", 0, 255, 255),
    ("azure", 0, 128, 255),
    ("blue", 0, 0, 255),
    ("violet", 128, 0, 255),
    ("magenta", 255, 0, 255),
    ("pink", 255, 0, 128),
    ("gray", 128, 128, 128),
];

/// Opaque ARGB.
fn argb(r: i64, g: i64, b: i64) -> i64 {
    (0xff << 24) | ((r & 0xff) << 16) | ((g & 0xff) << 8) | (b & 0xff)
}

fn integer(node: &NodeRef<'_>) -> Result<Value, EvaluationError> {
    let text = node.parsed_str();
    text.parse()
        .map(Value::Int)
        .map_err(|_| EvaluationError::InvalidNumber(text.to_string()))
}

fn float(node: &NodeRef<'_>) -> Result<Value, EvaluationError> {
    let text = node.parsed_str();
    text.parse()
        .map(Value::Float)
        .map_err(|_| EvaluationError::InvalidNumber(text.to_string()))
}

fn time(node: &NodeRef<'_>) -> Result<Value, EvaluationError> {
    let text = node.parsed_str();
    let invalid = || EvaluationError::InvalidTime(text.to_string());
    let (hour, minute) = text.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok(Value::Time { hour, minute })
}

fn bound(value: Value) -> Result<usize, EvaluationError> {
    let i = expect_int(value)?;
    usize::try_from(i).map_err(|_| EvaluationError::UnexpectedValue {
        expected: "a non-negative integer",
        found: Value::Int(i),
    })
}

fn integer_range(node: &NodeRef<'_>) -> Result<Value, EvaluationError> {
    let from = bound(node.evaluate_child(0)?)?;
    let to = bound(node.evaluate_child(1)?)?;
    Ok(Value::Range(IntRange::new(from, to)))
}

fn rgb(node: &NodeRef<'_>) -> Result<Value, EvaluationError> {
    let r = expect_int(node.evaluate_child(0)?)?;
    let g = expect_int(node.evaluate_child(1)?)?;
    let b = expect_int(node.evaluate_child(2)?)?;
    Ok(Value::Int(argb(r, g, b)))
}

/// Registers the built-in types into `grammar`.
pub(crate) fn register(grammar: &mut Grammar) {
    grammar
        .sequence(Some(DIGIT), vec![Terminal::Digit.unnamed()])
        .evaluator(evaluator::parsed_string)
        .inline();
    grammar
        .sequence(Some(LETTER), vec![Terminal::Letter.unnamed()])
        .evaluator(evaluator::parsed_string)
        .inline();
    let sign = grammar
        .or(
            Some(SIGN),
            vec![
                Terminal::literal("-").unnamed(),
                Terminal::literal("+").unnamed(),
            ],
        )
        .target();

    let optional_sign = grammar.optional(None, sign.named("sign")).target();
    let digits = grammar.plus(None, Terminal::Digit.named("digit")).target();
    let int = grammar
        .sequence(
            Some(INTEGER),
            vec![optional_sign.named("optional"), digits.named("plus")],
        )
        .evaluator(integer)
        .inline()
        .target();

    let optional_sign = grammar.optional(None, sign.unnamed()).target();
    let digits = grammar.plus(None, Terminal::Digit.unnamed()).target();
    let fraction_digits = grammar.star(None, Terminal::Digit.unnamed()).target();
    let fraction = grammar
        .sequence(
            None,
            vec![
                Terminal::literal(".").unnamed(),
                fraction_digits.named("star"),
            ],
        )
        .target();
    let optional_fraction = grammar.optional(None, fraction.named("sequence")).target();
    grammar
        .sequence(
            Some(FLOAT),
            vec![
                optional_sign.unnamed(),
                digits.unnamed(),
                optional_fraction.unnamed(),
            ],
        )
        .evaluator(float)
        .inline();

    let ws_star = grammar
        .star(Some(WHITESPACE_STAR), Terminal::Whitespace.unnamed())
        .autocompleter(IfNothingYetEntered::new(" "))
        .target();
    grammar
        .plus(Some(WHITESPACE_PLUS), Terminal::Whitespace.unnamed())
        .autocompleter(IfNothingYetEntered::new(" "));

    let dash = grammar
        .sequence(
            None,
            vec![
                ws_star.named("ws*"),
                Terminal::literal("-").unnamed(),
                ws_star.named("ws*"),
            ],
        )
        .target();
    grammar
        .join_with_names(
            Some(INTEGER_RANGE),
            int.into(),
            Join {
                open: None,
                close: None,
                delimiter: Some(dash.into()),
                only_keep_entries: true,
                cardinality: IntRange::exactly(2),
            },
            &["from", "to"],
        )
        .evaluator(integer_range);

    let optional_digit = grammar.optional(None, Terminal::Digit.unnamed()).target();
    grammar
        .sequence(
            Some(TIME),
            vec![
                optional_digit.unnamed(),
                Terminal::Digit.unnamed(),
                Terminal::literal(":").unnamed(),
                Terminal::Digit.unnamed(),
                Terminal::Digit.unnamed(),
            ],
        )
        .evaluator(time)
        .autocompleter(IfNothingYetEntered::new("${HH}:${MM}"));

    let months = MONTHS
        .iter()
        .zip(0..)
        .map(|(&month, i)| {
            grammar
                .sequence(None, vec![Terminal::literal(month).unnamed()])
                .evaluator(move |_| Ok(Value::Int(i)))
                .named(&month.to_lowercase())
        })
        .collect();
    grammar.or(Some(MONTH), months);

    let mut colors = vec![grammar
        .tuple(None, int.into(), &["red", "green", "blue"])
        .evaluator(rgb)
        .unnamed()];
    for (name, r, g, b) in COLORS {
        let color = grammar
            .sequence(None, vec![Terminal::literal(name).unnamed()])
            .evaluator(move |_| Ok(Value::Int(argb(r, g, b))))
            .unnamed();
        colors.push(color);
    }
    grammar.or(Some(COLOR), colors);

    grammar.star(Some(LINEBREAK_STAR), Terminal::literal("\n").unnamed());
}
