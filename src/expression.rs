use geojson::JsonObject;
use serde_json::Value;

use crate::error::{Result, TilerError};

/// Inputs an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub properties: &'a JsonObject,
    /// `Point`, `LineString`, `Polygon` or `Unknown`.
    pub geometry_type: &'a str,
    pub zoom: f64,
    /// Running value while folding cluster properties.
    pub accumulated: Option<&'a Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(properties: &'a JsonObject, geometry_type: &'a str) -> Self {
        Self {
            properties,
            geometry_type,
            zoom: 0.0,
            accumulated: None,
        }
    }
}

/// Scalar result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Null,
    String(String),
    Number(f64),
    Bool(bool),
}

impl ExprValue {
    /// Scalars map one to one; arrays and objects are opaque to expressions.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(text) => ExprValue::String(text.clone()),
            Value::Number(number) => number.as_f64().map_or(ExprValue::Null, ExprValue::Number),
            Value::Bool(flag) => ExprValue::Bool(*flag),
            Value::Null | Value::Array(_) | Value::Object(_) => ExprValue::Null,
        }
    }

    /// Integral numbers come back as JSON integers.
    pub fn to_json(&self) -> Value {
        match self {
            ExprValue::Null => Value::Null,
            ExprValue::String(text) => Value::String(text.clone()),
            ExprValue::Bool(flag) => Value::Bool(*flag),
            ExprValue::Number(number) => {
                if number.fract() == 0.0 && number.abs() < 9.0e15 {
                    Value::from(*number as i64)
                } else {
                    serde_json::Number::from_f64(*number).map_or(Value::Null, Value::Number)
                }
            }
        }
    }

    fn equals(&self, other: &ExprValue) -> bool {
        match (self, other) {
            (ExprValue::String(a), ExprValue::String(b)) => a == b,
            (ExprValue::Number(a), ExprValue::Number(b)) => a == b,
            (ExprValue::Bool(a), ExprValue::Bool(b)) => a == b,
            (ExprValue::Null, ExprValue::Null) => true,
            _ => false,
        }
    }

    fn compare(&self, other: &ExprValue) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (ExprValue::Number(a), ExprValue::Number(b)) => a.partial_cmp(b),
            (ExprValue::String(a), ExprValue::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            ExprValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            ExprValue::Null => false,
            ExprValue::Bool(flag) => *flag,
            ExprValue::Number(number) => *number != 0.0 && !number.is_nan(),
            ExprValue::String(text) => !text.is_empty(),
        }
    }

    fn to_text(&self) -> String {
        match self {
            ExprValue::Null => String::new(),
            ExprValue::Bool(flag) => flag.to_string(),
            ExprValue::Number(number) => number.to_string(),
            ExprValue::String(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
enum FilterKey {
    Property(String),
    Type,
    Zoom,
}

#[derive(Debug, Clone, Copy)]
enum CompareOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy)]
enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Max,
    Min,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(ExprValue),
    Get(String),
    Zoom,
    Type,
    Accumulated,
    Coalesce(Vec<Expr>),
    Match {
        input: Box<Expr>,
        cases: Vec<(Vec<ExprValue>, Expr)>,
        fallback: Box<Expr>,
    },
    Case {
        branches: Vec<(Filter, Expr)>,
        fallback: Box<Expr>,
    },
    Math(MathOp, Vec<Expr>),
    Concat(Vec<Expr>),
    ToNumber(Vec<Expr>),
    ToString(Box<Expr>),
    ToBoolean(Box<Expr>),
    Condition(Box<Filter>),
}

#[derive(Debug, Clone)]
enum Filter {
    Compare(CompareOp, Expr, Expr),
    In(Expr, Vec<ExprValue>),
    NotIn(Expr, Vec<ExprValue>),
    Has(FilterKey),
    NotHas(FilterKey),
    All(Vec<Filter>),
    Any(Vec<Filter>),
    None(Vec<Filter>),
    Not(Box<Filter>),
    Value(Expr),
}

impl Filter {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Filter::Compare(op, left, right) => {
                let actual = eval_expr(left, ctx);
                let expected = eval_expr(right, ctx);
                match op {
                    CompareOp::Eq => actual.equals(&expected),
                    CompareOp::Neq => !actual.equals(&expected),
                    CompareOp::Lt => actual.compare(&expected).is_some_and(|o| o.is_lt()),
                    CompareOp::Le => actual.compare(&expected).is_some_and(|o| o.is_le()),
                    CompareOp::Gt => actual.compare(&expected).is_some_and(|o| o.is_gt()),
                    CompareOp::Ge => actual.compare(&expected).is_some_and(|o| o.is_ge()),
                }
            }
            Filter::In(needle, values) => {
                let actual = eval_expr(needle, ctx);
                values.iter().any(|value| actual.equals(value))
            }
            Filter::NotIn(needle, values) => {
                let actual = eval_expr(needle, ctx);
                !values.iter().any(|value| actual.equals(value))
            }
            Filter::Has(key) => has_key(ctx, key),
            Filter::NotHas(key) => !has_key(ctx, key),
            Filter::All(filters) => filters.iter().all(|filter| filter.evaluate(ctx)),
            Filter::Any(filters) => filters.iter().any(|filter| filter.evaluate(ctx)),
            Filter::None(filters) => !filters.iter().any(|filter| filter.evaluate(ctx)),
            Filter::Not(filter) => !filter.evaluate(ctx),
            Filter::Value(expr) => matches!(eval_expr(expr, ctx), ExprValue::Bool(true)),
        }
    }
}

fn has_key(ctx: &EvalContext<'_>, key: &FilterKey) -> bool {
    match key {
        FilterKey::Type | FilterKey::Zoom => true,
        FilterKey::Property(name) => ctx.properties.contains_key(name),
    }
}

/// A compiled boolean feature filter.
#[derive(Debug, Clone)]
pub struct FeatureFilter {
    filter: Filter,
}

impl FeatureFilter {
    pub fn compile(value: &Value) -> Result<Self> {
        let filter = match value {
            Value::Bool(flag) => Some(Filter::Value(Expr::Literal(ExprValue::Bool(*flag)))),
            _ => parse_filter(value),
        }
        .ok_or_else(|| TilerError::invalid(format!("invalid filter expression: {value}")))?;
        Ok(Self { filter })
    }

    pub fn matches(&self, ctx: &EvalContext<'_>) -> bool {
        self.filter.evaluate(ctx)
    }
}

#[derive(Debug, Clone)]
struct ClusterProperty {
    name: String,
    map: Expr,
    reduce: Expr,
}

/// `clusterProperties` compiled into a per-point `map` and a pairwise `reduce`.
#[derive(Debug, Clone, Default)]
pub struct ClusterProperties {
    entries: Vec<ClusterProperty>,
}

impl ClusterProperties {
    /// Parses `{name: [operator, mapExpression]}`. A string operator `op`
    /// folds as `[op, ["accumulated"], ["get", name]]`.
    pub fn compile(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| TilerError::invalid("clusterProperties must be an object"))?;
        let mut entries = Vec::with_capacity(object.len());
        for (name, definition) in object {
            let invalid = || TilerError::invalid(format!("invalid cluster property '{name}'"));
            let pair = definition.as_array().filter(|pair| pair.len() == 2).ok_or_else(invalid)?;
            let reduce = match &pair[0] {
                Value::String(op) => {
                    let expanded = serde_json::json!([op, ["accumulated"], ["get", name]]);
                    parse_expr(&expanded)
                }
                other => parse_expr(other),
            }
            .ok_or_else(invalid)?;
            let map = parse_expr(&pair[1]).ok_or_else(invalid)?;
            entries.push(ClusterProperty {
                name: name.clone(),
                map,
                reduce,
            });
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Projects a point's properties onto the aggregated ones.
    pub fn map(&self, properties: &JsonObject) -> JsonObject {
        let ctx = EvalContext::new(properties, "Point");
        self.entries
            .iter()
            .map(|entry| (entry.name.clone(), eval_expr(&entry.map, &ctx).to_json()))
            .collect()
    }

    /// Folds `properties` (an already mapped point or cluster) into `accumulated`.
    pub fn reduce(&self, accumulated: &mut JsonObject, properties: &JsonObject) {
        for entry in &self.entries {
            let current = accumulated.get(&entry.name).cloned().unwrap_or(Value::Null);
            let ctx = EvalContext {
                accumulated: Some(&current),
                ..EvalContext::new(properties, "Point")
            };
            let next = eval_expr(&entry.reduce, &ctx).to_json();
            accumulated.insert(entry.name.clone(), next);
        }
    }
}

fn parse_filter(value: &Value) -> Option<Filter> {
    let array = value.as_array()?;
    let op = array.first()?.as_str()?;
    match op {
        "!" => {
            let inner = parse_filter(array.get(1)?)?;
            Some(Filter::Not(Box::new(inner)))
        }
        "==" | "!=" | "<" | "<=" | ">" | ">=" => {
            if array.len() < 3 {
                return None;
            }
            let left = parse_filter_lhs(&array[1])?;
            let right = parse_expr(&array[2])?;
            let op = match op {
                "==" => CompareOp::Eq,
                "!=" => CompareOp::Neq,
                "<" => CompareOp::Lt,
                "<=" => CompareOp::Le,
                ">" => CompareOp::Gt,
                _ => CompareOp::Ge,
            };
            Some(Filter::Compare(op, left, right))
        }
        "in" | "!in" => {
            if array.len() < 3 {
                return None;
            }
            let needle = parse_filter_lhs(&array[1])?;
            let list = match &array[2] {
                Value::Array(items) if items.first().and_then(Value::as_str) == Some("literal") => {
                    items.get(1)?.as_array()?.as_slice()
                }
                Value::Array(items) => items.as_slice(),
                _ => &array[2..],
            };
            let values = list
                .iter()
                .map(parse_filter_value)
                .collect::<Option<Vec<_>>>()?;
            if op == "in" {
                Some(Filter::In(needle, values))
            } else {
                Some(Filter::NotIn(needle, values))
            }
        }
        "has" | "!has" => {
            let key = parse_filter_key(array.get(1)?)?;
            if op == "has" {
                Some(Filter::Has(key))
            } else {
                Some(Filter::NotHas(key))
            }
        }
        "all" | "any" | "none" => {
            let filters = array[1..]
                .iter()
                .map(parse_filter)
                .collect::<Option<Vec<_>>>()?;
            match op {
                "all" => Some(Filter::All(filters)),
                "any" => Some(Filter::Any(filters)),
                _ => Some(Filter::None(filters)),
            }
        }
        _ => parse_value_expr(value).map(Filter::Value),
    }
}

fn parse_filter_value(value: &Value) -> Option<ExprValue> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Some(ExprValue::from_json(value)),
        _ => None,
    }
}

fn parse_expr(value: &Value) -> Option<Expr> {
    if let Some(literal) = parse_filter_value(value) {
        return Some(Expr::Literal(literal));
    }
    if value.is_null() {
        return Some(Expr::Literal(ExprValue::Null));
    }
    parse_value_expr(value).or_else(|| parse_filter(value).map(|f| Expr::Condition(Box::new(f))))
}

/// Expression forms that produce a value rather than a predicate.
fn parse_value_expr(value: &Value) -> Option<Expr> {
    let array = value.as_array()?;
    let op = array.first()?.as_str()?;
    let args = || {
        array[1..]
            .iter()
            .map(parse_expr)
            .collect::<Option<Vec<_>>>()
    };
    match op {
        "get" => {
            let key = array.get(1)?.as_str()?;
            Some(Expr::Get(key.to_string()))
        }
        "literal" => parse_filter_value(array.get(1)?).map(Expr::Literal),
        "zoom" => Some(Expr::Zoom),
        "geometry-type" => Some(Expr::Type),
        "accumulated" => Some(Expr::Accumulated),
        "coalesce" => {
            let items = args()?;
            (!items.is_empty()).then_some(Expr::Coalesce(items))
        }
        "match" => {
            if array.len() < 5 {
                return None;
            }
            let input = parse_expr(&array[1])?;
            let mut cases = Vec::new();
            let mut idx = 2;
            while idx + 1 < array.len() - 1 {
                let labels = match &array[idx] {
                    Value::Array(items) => items
                        .iter()
                        .map(parse_filter_value)
                        .collect::<Option<Vec<_>>>()?,
                    label => vec![parse_filter_value(label)?],
                };
                let output = parse_expr(&array[idx + 1])?;
                cases.push((labels, output));
                idx += 2;
            }
            let fallback = parse_expr(array.last()?)?;
            Some(Expr::Match {
                input: Box::new(input),
                cases,
                fallback: Box::new(fallback),
            })
        }
        "case" => {
            if array.len() < 4 {
                return None;
            }
            let mut branches = Vec::new();
            let mut idx = 1;
            while idx + 1 < array.len() - 1 {
                let condition = parse_filter(&array[idx])?;
                let output = parse_expr(&array[idx + 1])?;
                branches.push((condition, output));
                idx += 2;
            }
            let fallback = parse_expr(array.last()?)?;
            Some(Expr::Case {
                branches,
                fallback: Box::new(fallback),
            })
        }
        "+" | "-" | "*" | "/" | "%" | "max" | "min" => {
            let op = match op {
                "+" => MathOp::Add,
                "-" => MathOp::Sub,
                "*" => MathOp::Mul,
                "/" => MathOp::Div,
                "%" => MathOp::Rem,
                "max" => MathOp::Max,
                _ => MathOp::Min,
            };
            let items = args()?;
            (!items.is_empty()).then_some(Expr::Math(op, items))
        }
        "concat" => args().map(Expr::Concat),
        "to-number" => args().map(Expr::ToNumber),
        "to-string" => parse_expr(array.get(1)?).map(|e| Expr::ToString(Box::new(e))),
        "to-boolean" => parse_expr(array.get(1)?).map(|e| Expr::ToBoolean(Box::new(e))),
        _ => None,
    }
}

fn parse_filter_key(value: &Value) -> Option<FilterKey> {
    if let Some(name) = value.as_str() {
        return Some(match name {
            "$type" => FilterKey::Type,
            "$zoom" => FilterKey::Zoom,
            _ => FilterKey::Property(name.to_string()),
        });
    }
    let array = value.as_array()?;
    match array.first()?.as_str()? {
        "get" => {
            let key = array.get(1)?.as_str()?;
            Some(FilterKey::Property(key.to_string()))
        }
        "zoom" => Some(FilterKey::Zoom),
        "geometry-type" => Some(FilterKey::Type),
        _ => None,
    }
}

/// Left-hand side of a comparison: a bare string names a property (legacy
/// syntax), anything else is an expression.
fn parse_filter_lhs(value: &Value) -> Option<Expr> {
    if value.is_string() {
        return parse_filter_key(value).map(expr_from_key);
    }
    parse_expr(value)
}

fn expr_from_key(key: FilterKey) -> Expr {
    match key {
        FilterKey::Property(name) => Expr::Get(name),
        FilterKey::Zoom => Expr::Zoom,
        FilterKey::Type => Expr::Type,
    }
}

fn eval_expr(expr: &Expr, ctx: &EvalContext<'_>) -> ExprValue {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Get(name) => ctx
            .properties
            .get(name)
            .map_or(ExprValue::Null, ExprValue::from_json),
        Expr::Zoom => ExprValue::Number(ctx.zoom),
        Expr::Type => ExprValue::String(ctx.geometry_type.to_string()),
        Expr::Accumulated => ctx.accumulated.map_or(ExprValue::Null, ExprValue::from_json),
        Expr::Coalesce(items) => items
            .iter()
            .map(|item| eval_expr(item, ctx))
            .find(|value| *value != ExprValue::Null)
            .unwrap_or(ExprValue::Null),
        Expr::Match {
            input,
            cases,
            fallback,
        } => {
            let input_value = eval_expr(input, ctx);
            for (labels, output) in cases {
                if labels.iter().any(|label| input_value.equals(label)) {
                    return eval_expr(output, ctx);
                }
            }
            eval_expr(fallback, ctx)
        }
        Expr::Case { branches, fallback } => {
            for (condition, output) in branches {
                if condition.evaluate(ctx) {
                    return eval_expr(output, ctx);
                }
            }
            eval_expr(fallback, ctx)
        }
        Expr::Math(op, items) => {
            let Some(numbers) = items
                .iter()
                .map(|item| eval_expr(item, ctx).as_number())
                .collect::<Option<Vec<f64>>>()
            else {
                return ExprValue::Null;
            };
            eval_math(*op, &numbers).map_or(ExprValue::Null, ExprValue::Number)
        }
        Expr::Concat(items) => ExprValue::String(
            items
                .iter()
                .map(|item| eval_expr(item, ctx).to_text())
                .collect(),
        ),
        Expr::ToNumber(items) => {
            for item in items {
                match eval_expr(item, ctx) {
                    ExprValue::Number(number) => return ExprValue::Number(number),
                    ExprValue::Bool(flag) => return ExprValue::Number(f64::from(u8::from(flag))),
                    ExprValue::String(text) => {
                        if let Ok(number) = text.trim().parse::<f64>() {
                            return ExprValue::Number(number);
                        }
                    }
                    ExprValue::Null => return ExprValue::Number(0.0),
                }
            }
            ExprValue::Null
        }
        Expr::ToString(inner) => ExprValue::String(eval_expr(inner, ctx).to_text()),
        Expr::ToBoolean(inner) => ExprValue::Bool(eval_expr(inner, ctx).truthy()),
        Expr::Condition(filter) => ExprValue::Bool(filter.evaluate(ctx)),
    }
}

fn eval_math(op: MathOp, numbers: &[f64]) -> Option<f64> {
    let (&first, rest) = numbers.split_first()?;
    match op {
        MathOp::Add => Some(numbers.iter().sum()),
        MathOp::Mul => Some(numbers.iter().product()),
        MathOp::Max => Some(rest.iter().fold(first, |acc, &n| acc.max(n))),
        MathOp::Min => Some(rest.iter().fold(first, |acc, &n| acc.min(n))),
        MathOp::Sub => match rest {
            [] => Some(-first),
            [second] => Some(first - second),
            _ => None,
        },
        MathOp::Div => rest.first().map(|second| first / second),
        MathOp::Rem => rest.first().map(|second| first % second),
    }
}
