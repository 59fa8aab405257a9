// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! List extraction from the envelopes PBX nodes return.
//!
//! Nodes are inconsistent: a list may arrive as a paginator
//! (`{data: {data: [..]}}`), wrapped (`{data: [..]}`), under a resource key
//! (`{dids: [..]}`), or bare (`[..]`). Shapes are probed in that order and the
//! first one that yields an actual array wins. Nothing is coerced.

use serde_json::Value;

/// One envelope layout that may hold a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListShape<'a> {
    NestedPage,
    DataArray,
    Named(&'a str),
    Bare,
}

impl<'a> ListShape<'a> {
    /// Shapes in probe order. `Named` is included only when a key is given.
    pub fn probe_order(key: Option<&'a str>) -> Vec<ListShape<'a>> {
        let mut order = vec![Self::NestedPage, Self::DataArray];
        if let Some(key) = key {
            order.push(Self::Named(key));
        }
        order.push(Self::Bare);
        order
    }

    pub fn extract<'v>(&self, value: &'v Value) -> Option<&'v Vec<Value>> {
        match *self {
            Self::NestedPage => value.get("data")?.get("data")?.as_array(),
            Self::DataArray => value.get("data")?.as_array(),
            Self::Named(key) => value.get(key)?.as_array(),
            Self::Bare => value.as_array(),
        }
    }
}

/// First matching shape and the list it holds.
pub fn extract_list<'a, 'v>(
    value: &'v Value,
    key: Option<&'a str>,
) -> Option<(ListShape<'a>, &'v Vec<Value>)> {
    ListShape::probe_order(key)
        .into_iter()
        .find_map(|shape| shape.extract(value).map(|l| (shape, l)))
}

/// The extracted list as a JSON array, or an empty array when nothing matched.
pub fn list_or_empty(value: &Value, key: Option<&str>) -> Value {
    match extract_list(value, key) {
        Some((_, list)) => Value::Array(list.clone()),
        None => Value::Array(Vec::new()),
    }
}

#[cfg(test)]
#[path = "shape_tests.rs"]
mod tests;
