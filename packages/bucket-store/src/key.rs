//! Flat key layout for nested buckets.
//!
//! Every name is written followed by a NUL terminator, so the key of
//! `portmap/tcp` is `portmap\0tcp\0`. A bucket's own key holds
//! [`BUCKET_MARKER`]; a plain field holds [`FIELD_TAG`] followed by its UTF-8
//! value. Everything below a bucket sorts between its key and
//! [`prefix_end`] of that key.

pub(crate) const SEPARATOR: u8 = 0x00;
pub(crate) const BUCKET_MARKER: u8 = 0x00;
pub(crate) const FIELD_TAG: u8 = 0x01;

/// What a single key slot holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    Bucket,
    Field(String),
}

pub(crate) fn push_segment(out: &mut Vec<u8>, name: &str) {
    out.extend_from_slice(name.as_bytes());
    out.push(SEPARATOR);
}

pub(crate) fn child_key(prefix: &[u8], name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + name.len() + 1);
    out.extend_from_slice(prefix);
    push_segment(&mut out, name);
    out
}

/// Exclusive upper bound of the subtree rooted at `prefix`.
///
/// Returns `None` for the root, whose subtree is the whole table.
pub(crate) fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let (last, head) = prefix.split_last()?;
    debug_assert_eq!(*last, SEPARATOR);
    let mut end = head.to_vec();
    end.push(SEPARATOR + 1);
    Some(end)
}

/// Segments of `key` below `prefix`, without their terminators.
///
/// `key` must lie inside the subtree of `prefix`.
pub(crate) fn relative_segments<'k>(prefix: &[u8], key: &'k [u8]) -> Vec<&'k [u8]> {
    let rest = &key[prefix.len()..];
    match rest.split_last() {
        Some((_, body)) => body.split(|b| *b == SEPARATOR).collect(),
        None => Vec::new(),
    }
}

pub(crate) fn encode_field(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 1);
    out.push(FIELD_TAG);
    out.extend_from_slice(value.as_bytes());
    out
}

/// Decode a stored value. `None` means the bytes are not a valid slot.
pub(crate) fn decode_slot(raw: &[u8]) -> Option<Slot> {
    match raw.split_first() {
        Some((&BUCKET_MARKER, [])) => Some(Slot::Bucket),
        Some((&FIELD_TAG, value)) => std::str::from_utf8(value)
            .ok()
            .map(|s| Slot::Field(s.to_string())),
        _ => None,
    }
}
