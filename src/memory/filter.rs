use crate::errors::OpError;
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, regex: regex::Regex },
}

/// Compile a filter document into a `Filter`.
///
/// # Errors
/// Returns `OpError::Store` for unknown operators or malformed operands.
pub fn compile(doc: &BsonDocument) -> Result<Filter, OpError> {
    let mut parts = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        match key.as_str() {
            "$and" => parts.push(Filter::And(compile_list(key, value)?)),
            "$or" => parts.push(Filter::Or(compile_list(key, value)?)),
            "$nor" => parts.push(Filter::Nor(compile_list(key, value)?)),
            op if op.starts_with('$') => {
                return Err(OpError::Store(format!("unknown top level operator: {op}")));
            }
            path => parts.push(compile_field(path, value)?),
        }
    }
    Ok(match parts.len() {
        0 => Filter::True,
        1 => parts.swap_remove(0),
        _ => Filter::And(parts),
    })
}

fn compile_list(op: &str, value: &Bson) -> Result<Vec<Filter>, OpError> {
    let Bson::Array(items) = value else {
        return Err(OpError::Store(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(OpError::Store(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => compile(d),
            _ => Err(OpError::Store(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn is_operator_doc(value: &Bson) -> Option<&BsonDocument> {
    match value {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn compile_field(path: &str, value: &Bson) -> Result<Filter, OpError> {
    let Some(ops) = is_operator_doc(value) else {
        if matches!(value, Bson::RegularExpression(_)) {
            return compile_regex(path.to_string(), value, "");
        }
        return Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: value.clone() });
    };
    let mut parts = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let path = path.to_string();
        let f = match op.as_str() {
            "$eq" => Filter::Cmp { path, op: CmpOp::Eq, value: operand.clone() },
            "$ne" => Filter::Cmp { path, op: CmpOp::Ne, value: operand.clone() },
            "$gt" => Filter::Cmp { path, op: CmpOp::Gt, value: operand.clone() },
            "$gte" => Filter::Cmp { path, op: CmpOp::Gte, value: operand.clone() },
            "$lt" => Filter::Cmp { path, op: CmpOp::Lt, value: operand.clone() },
            "$lte" => Filter::Cmp { path, op: CmpOp::Lte, value: operand.clone() },
            "$in" => Filter::In { path, values: operand_set(op, operand)? },
            "$nin" => Filter::Nin { path, values: operand_set(op, operand)? },
            "$exists" => Filter::Exists { path, exists: truthy(operand) },
            "$not" => match operand {
                Bson::Document(_) => Filter::Not(Box::new(compile_field(&path, operand)?)),
                _ => return Err(OpError::Store("$not needs a document".into())),
            },
            "$options" => continue,
            "$regex" => compile_regex(path, operand, ops.get_str("$options").unwrap_or(""))?,
            other => return Err(OpError::Store(format!("unknown operator: {other}"))),
        };
        parts.push(f);
    }
    Ok(if parts.len() == 1 { parts.swap_remove(0) } else { Filter::And(parts) })
}

fn operand_set(op: &str, operand: &Bson) -> Result<Vec<Bson>, OpError> {
    match operand {
        Bson::Array(values) if values.len() > MAX_IN_SET => {
            Err(OpError::Store(format!("{op} accepts at most {MAX_IN_SET} values")))
        }
        Bson::Array(values) => Ok(values.clone()),
        _ => Err(OpError::Store(format!("{op} needs an array"))),
    }
}

fn truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

#[cfg(feature = "regex")]
fn compile_regex(path: String, operand: &Bson, options: &str) -> Result<Filter, OpError> {
    let (pattern, options) = match operand {
        Bson::String(p) => (p.as_str(), options.to_string()),
        Bson::RegularExpression(re) => {
            (re.pattern.as_str(), format!("{}{options}", re.options.as_str()))
        }
        _ => return Err(OpError::Store("$regex has to be a string or a regex".into())),
    };
    let regex = regex::RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| OpError::Store(format!("invalid regex: {e}")))?;
    Ok(Filter::Regex { path, regex })
}

#[cfg(not(feature = "regex"))]
fn compile_regex(_path: String, _operand: &Bson, _options: &str) -> Result<Filter, OpError> {
    Err(OpError::Store("$regex requires the 'regex' feature".into()))
}

pub fn eval_filter(doc: &BsonDocument, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Filter::In { path, values } => {
            values.iter().any(|x| matches_eq(get_path(doc, path), x))
        }
        Filter::Nin { path, values } => {
            !values.iter().any(|x| matches_eq(get_path(doc, path), x))
        }
        Filter::Cmp { path, op, value } => {
            let found = get_path(doc, path);
            match op {
                CmpOp::Eq => matches_eq(found, value),
                CmpOp::Ne => !matches_eq(found, value),
                CmpOp::Gt => matches_ord(found, value, |o| o == Ordering::Greater),
                CmpOp::Gte => matches_ord(found, value, |o| o != Ordering::Less),
                CmpOp::Lt => matches_ord(found, value, |o| o == Ordering::Less),
                CmpOp::Lte => matches_ord(found, value, |o| o != Ordering::Greater),
            }
        }
        #[cfg(feature = "regex")]
        Filter::Regex { path, regex } => match get_path(doc, path) {
            Some(Bson::String(s)) => regex.is_match(s),
            Some(Bson::Array(items)) => {
                items.iter().any(|i| matches!(i, Bson::String(s) if regex.is_match(s)))
            }
            _ => false,
        },
    }
}

/// Equality with array membership and null-matches-missing.
fn matches_eq(found: Option<&Bson>, value: &Bson) -> bool {
    match found {
        None => matches!(value, Bson::Null),
        Some(v) if values_equal(v, value) => true,
        Some(Bson::Array(items)) => items.iter().any(|i| values_equal(i, value)),
        Some(_) => false,
    }
}

fn matches_ord(found: Option<&Bson>, value: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |v: &Bson| comparable(v, value) && accept(compare_bson(v, value));
    match found {
        Some(Bson::Array(items)) if !matches!(value, Bson::Array(_)) => items.iter().any(check),
        Some(v) => check(v),
        None => false,
    }
}

fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        Bson::Decimal128(d) => d.to_string().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    if is_num(a) && is_num(b) {
        return compare_bson(a, b) == Ordering::Equal;
    }
    a == b
}

/// Range operators only compare values of the same kind.
fn comparable(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b))
        || matches!(
            (a, b),
            (Bson::String(_), Bson::String(_))
                | (Bson::Boolean(_), Bson::Boolean(_))
                | (Bson::DateTime(_), Bson::DateTime(_))
                | (Bson::ObjectId(_), Bson::ObjectId(_))
        )
}

fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth + 1 >= MAX_PATH_DEPTH {
            return None;
        }
        cur = match cur {
            Bson::Document(d) => d.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if is_num(a) && is_num(b) {
        return as_f64_num(a).total_cmp(&as_f64_num(b));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) => 12,
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 13,
        Bson::MaxKey => 255,
    }
}
