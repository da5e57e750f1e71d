use super::filter::{MAX_PATH_DEPTH, as_f64_num};
use crate::errors::OpError;
use crate::value::bson_type_name;
use bson::{Bson, Document as BsonDocument};

// Largest gap an indexed write may pad with nulls
const MAX_ARRAY_PAD: usize = 1024;

/// A compiled update. Documents without `$` operators are applied as `$set`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateDoc {
    pub set: Vec<(String, Bson)>,
    pub inc: Vec<(String, Bson)>,
    pub unset: Vec<String>,
}

impl UpdateDoc {
    /// # Errors
    /// Returns `OpError::Store` for empty documents, documents mixing operators
    /// with plain fields, unknown operators, or non-numeric `$inc` operands.
    pub fn compile(doc: &BsonDocument) -> Result<Self, OpError> {
        if doc.is_empty() {
            return Err(OpError::Store("update document must not be empty".into()));
        }
        let operators = doc.keys().filter(|k| k.starts_with('$')).count();
        if operators == 0 {
            return Ok(Self {
                set: doc.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                ..Self::default()
            });
        }
        if operators != doc.len() {
            return Err(OpError::Store(
                "update document mixes operators and plain fields".into(),
            ));
        }
        let mut out = Self::default();
        for (op, operand) in doc {
            let Bson::Document(fields) = operand else {
                return Err(OpError::Store(format!("{op} needs a document")));
            };
            match op.as_str() {
                "$set" => {
                    out.set.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                "$inc" => {
                    for (k, v) in fields {
                        if !matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) {
                            return Err(OpError::Store(format!(
                                "$inc requires numeric, found {} for '{k}'",
                                bson_type_name(v)
                            )));
                        }
                        out.inc.push((k.clone(), v.clone()));
                    }
                }
                "$unset" => out.unset.extend(fields.keys().cloned()),
                other => return Err(OpError::Store(format!("unsupported update operator: {other}"))),
            }
        }
        Ok(out)
    }

    /// Apply to `doc`, returning whether anything changed.
    ///
    /// # Errors
    /// Returns `OpError::Store` when the update would change `_id`, increment
    /// a non-numeric field, or write a path through a scalar. `doc` may be
    /// partially modified on error.
    pub fn apply(&self, doc: &mut BsonDocument) -> Result<bool, OpError> {
        let mut changed = false;
        for (k, v) in &self.set {
            if k == "_id" && doc.get("_id").is_some_and(|old| old != v) {
                return Err(OpError::Store("the field '_id' is immutable".into()));
            }
            changed |= set_path(doc, k, v.clone())?;
        }
        for (k, by) in &self.inc {
            let next = add_numbers(get_path(doc, k), by)?;
            changed |= set_path(doc, k, next)?;
        }
        for k in &self.unset {
            changed |= unset_path(doc, k);
        }
        Ok(changed)
    }
}

fn segments(path: &str) -> Result<Vec<&str>, OpError> {
    let segs: Vec<&str> = path.split('.').collect();
    if segs.iter().any(|s| s.is_empty()) {
        return Err(OpError::Store(format!("empty field name in path '{path}'")));
    }
    if segs.len() > MAX_PATH_DEPTH {
        return Err(OpError::Store(format!("path '{path}' is nested too deeply")));
    }
    Ok(segs)
}

fn not_traversable(field: &str, name: &str, found: &Bson) -> OpError {
    OpError::Store(format!(
        "cannot create field '{field}' in element {{{name}: {}}}",
        bson_type_name(found)
    ))
}

fn set_path(root: &mut BsonDocument, path: &str, value: Bson) -> Result<bool, OpError> {
    set_in_doc(root, &segments(path)?, value)
}

fn set_in_doc(doc: &mut BsonDocument, segs: &[&str], value: Bson) -> Result<bool, OpError> {
    let Some((head, rest)) = segs.split_first() else {
        return Ok(false);
    };
    if rest.is_empty() {
        let old = doc.insert((*head).to_string(), value.clone());
        return Ok(old.as_ref() != Some(&value));
    }
    if doc.get(*head).is_none() {
        doc.insert((*head).to_string(), BsonDocument::new());
    }
    match doc.get_mut(*head) {
        Some(child) => set_in_value(child, head, rest, value),
        None => Ok(false),
    }
}

fn set_in_value(target: &mut Bson, name: &str, segs: &[&str], value: Bson) -> Result<bool, OpError> {
    match target {
        Bson::Document(d) => set_in_doc(d, segs, value),
        Bson::Array(items) => set_in_array(items, name, segs, value),
        other => Err(not_traversable(segs.first().copied().unwrap_or(""), name, other)),
    }
}

/// Numeric segments index into arrays; writing past the end pads with nulls.
fn set_in_array(
    items: &mut Vec<Bson>,
    name: &str,
    segs: &[&str],
    value: Bson,
) -> Result<bool, OpError> {
    let Some((head, rest)) = segs.split_first() else {
        return Ok(false);
    };
    let idx = head.parse::<usize>().map_err(|_| {
        OpError::Store(format!("cannot create field '{head}' in array '{name}'"))
    })?;
    if idx >= items.len() {
        if idx - items.len() > MAX_ARRAY_PAD {
            return Err(OpError::Store(format!("index {idx} is too far past the end of '{name}'")));
        }
        let fill = if rest.is_empty() { Bson::Null } else { Bson::Document(BsonDocument::new()) };
        items.resize(idx, Bson::Null);
        items.push(fill);
    }
    let Some(slot) = items.get_mut(idx) else {
        return Ok(false);
    };
    if rest.is_empty() {
        let changed = *slot != value;
        *slot = value;
        return Ok(changed);
    }
    set_in_value(slot, head, rest, value)
}

fn get_path<'a>(root: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut segs = path.split('.');
    let mut cur = root.get(segs.next()?)?;
    for seg in segs {
        cur = match cur {
            Bson::Document(d) => d.get(seg)?,
            Bson::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Unsetting an array element leaves a null in its place.
fn unset_path(root: &mut BsonDocument, path: &str) -> bool {
    let segs: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segs.split_last() else {
        return false;
    };
    let Some((first, between)) = parents.split_first() else {
        return root.remove(*last).is_some();
    };
    let mut cur = root.get_mut(*first);
    for seg in between {
        cur = match cur {
            Some(Bson::Document(d)) => d.get_mut(*seg),
            Some(Bson::Array(items)) => seg.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
    }
    match cur {
        Some(Bson::Document(d)) => d.remove(*last).is_some(),
        Some(Bson::Array(items)) => match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            Some(slot) if *slot != Bson::Null => {
                *slot = Bson::Null;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// Integer arithmetic stays integral while it fits; anything touching a double becomes a double.
fn add_numbers(current: Option<&Bson>, by: &Bson) -> Result<Bson, OpError> {
    let Some(current) = current else {
        return Ok(by.clone());
    };
    let overflow = || OpError::Store("$inc overflowed a 64-bit integer".into());
    match (current, by) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(a.checked_add(*b).map_or_else(
            || Bson::Int64(i64::from(*a) + i64::from(*b)),
            Bson::Int32,
        )),
        (Bson::Int32(a), Bson::Int64(b)) => {
            i64::from(*a).checked_add(*b).map(Bson::Int64).ok_or_else(overflow)
        }
        (Bson::Int64(a), Bson::Int32(b)) => {
            a.checked_add(i64::from(*b)).map(Bson::Int64).ok_or_else(overflow)
        }
        (Bson::Int64(a), Bson::Int64(b)) => a.checked_add(*b).map(Bson::Int64).ok_or_else(overflow),
        (Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_), _) => {
            Ok(Bson::Double(as_f64_num(current) + as_f64_num(by)))
        }
        (other, _) => Err(OpError::Store(format!(
            "cannot apply $inc to a value of type {}",
            bson_type_name(other)
        ))),
    }
}

/// Seed for an upsert: the plain equality fields of the filter.
///
/// # Errors
/// Returns `OpError::Store` when two equality paths collide, as in
/// `{a: 1, "a.b": 2}`.
pub fn upsert_seed(filter: &BsonDocument) -> Result<BsonDocument, OpError> {
    let mut seed = BsonDocument::new();
    for (k, v) in filter {
        if k.starts_with('$') {
            continue;
        }
        if matches!(v, Bson::Document(d) if d.keys().next().is_some_and(|op| op.starts_with('$'))) {
            continue;
        }
        set_path(&mut seed, k, v.clone())?;
    }
    Ok(seed)
}
