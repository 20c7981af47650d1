//! # Numeric Arrays
//!
//! Dense row-major `f64` arrays of rank ≥ 1, and the 4×4 `Transform`.
//!
//! ## Wire Format
//!
//! - Array: `!ndarray [[1.0, 2.0], [3.0, 4.0]]`. Only the outermost sequence
//!   is tagged; the nesting depth is the rank.
//! - Transform: `!Transform [[m00, m01, m02, m03], ..., [m30, m31, m32, m33]]`
//!
//! Decoding accepts integer leaves and widens them. Ragged nesting fails.
//! Only the last dimension may be zero: an empty sequence has no first
//! element to carry the dimensions below it.

use tagpack::Node;
use tagpack::Tag;

use crate::error::Error;
use crate::error::Result;
use crate::resolve::Resolver;
use crate::tags;
use crate::value::Value;

/// A dense, row-major array of `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Array {
    /// Returns `None` unless `shape` is non-empty, its product is `data.len()`,
    /// and only the last dimension may be zero.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        if shape.is_empty() || element_count(&shape) != Some(data.len()) {
            return None;
        }
        // the wire form cannot carry dimensions nested under an empty one
        let (_, outer) = shape.split_last()?;
        if outer.contains(&0) {
            return None;
        }
        Some(Self { shape, data })
    }

    /// A rank-1 array.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self { shape: vec![data.len()], data }
    }

    /// A rank-2 array. Returns `None` if there are no rows or they differ in length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let cols = rows.first()?.len();
        if rows.iter().any(|row| row.len() != cols) {
            return None;
        }
        Self::new(vec![rows.len(), cols], rows.concat())
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Elements in row-major order.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Reads the element at a full index.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        self.data.get(offset).copied()
    }
}

/// A spatial transform as a row-major 4×4 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m: [[f64; 4]; 4],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn from_rows(m: [[f64; 4]; 4]) -> Self {
        Self { m }
    }

    /// A pure translation.
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut t = Self::IDENTITY;
        t.m[0][3] = x;
        t.m[1][3] = y;
        t.m[2][3] = z;
        t
    }

    pub fn to_array(&self) -> Array {
        Array {
            shape: vec![4, 4],
            data: self.m.concat(),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TryFrom<&Array> for Transform {
    type Error = Error;

    fn try_from(array: &Array) -> Result<Self> {
        if array.shape() != [4, 4] {
            return Err(Error::malformed(&tags::TRANSFORM, format!("expected shape [4, 4], got {:?}", array.shape())));
        }
        let mut m = [[0.0; 4]; 4];
        for (row, chunk) in m.iter_mut().zip(array.data().chunks_exact(4)) {
            row.copy_from_slice(chunk);
        }
        Ok(Self { m })
    }
}

// ============================================================================
//  ENCODING
// ============================================================================

pub(crate) fn encode_array(array: &Array) -> Result<Node> {
    Ok(nest(&array.shape, &array.data))
}

pub(crate) fn encode_transform(transform: &Transform) -> Result<Node> {
    let rows = transform
        .m
        .iter()
        .map(|row| Node::seq(row.iter().copied().map(Node::Float).collect()))
        .collect();
    Ok(Node::seq(rows))
}

fn nest(shape: &[usize], data: &[f64]) -> Node {
    let Some((&len, rest)) = shape.split_first() else {
        return Node::seq(Vec::new());
    };
    if rest.is_empty() {
        return Node::seq(data.iter().copied().map(Node::Float).collect());
    }
    let stride = rest.iter().product::<usize>();
    Node::seq((0..len).map(|i| nest(rest, &data[i * stride..(i + 1) * stride])).collect())
}

// ============================================================================
//  DECODING
// ============================================================================

pub(crate) fn decode_array(node: &Node, _resolver: &dyn Resolver) -> Result<Value> {
    let tag = &tags::ARRAY;
    let shape = leading_shape(node);
    if shape.is_empty() {
        return Err(Error::malformed(tag, "expected a sequence"));
    }
    if element_count(&shape).is_none() {
        return Err(Error::malformed(tag, format!("shape {:?} is too large", shape)));
    }
    // grows with the checked elements, not with the claimed shape
    let mut data = Vec::new();
    flatten(tag, node, &shape, 0, &mut data)?;
    Ok(Value::object(Array { shape, data }))
}

pub(crate) fn decode_transform(node: &Node, _resolver: &dyn Resolver) -> Result<Value> {
    let tag = &tags::TRANSFORM;
    let rows = match node.as_seq() {
        Some(rows) if rows.len() == 4 => rows,
        _ => return Err(Error::malformed(tag, "transform must have 4 rows")),
    };
    let mut m = [[0.0; 4]; 4];
    for (out, row) in m.iter_mut().zip(rows) {
        let cols = match row.as_seq() {
            Some(cols) if cols.len() == 4 => cols,
            _ => return Err(Error::malformed(tag, "transform must have 4 columns")),
        };
        for (cell, col) in out.iter_mut().zip(cols) {
            *cell = number(tag, col)?;
        }
    }
    Ok(Value::object(Transform { m }))
}

/// Product of the dimensions, or `None` on overflow.
fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Follows first elements down to the leaves to find the candidate shape.
fn leading_shape(node: &Node) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut cur = node;
    while let Some(items) = cur.as_seq() {
        shape.push(items.len());
        match items.first() {
            Some(first) if first.as_seq().is_some() => cur = first,
            _ => break,
        }
    }
    shape
}

fn flatten(tag: &Tag, node: &Node, shape: &[usize], depth: usize, data: &mut Vec<f64>) -> Result<()> {
    let items = node
        .as_seq()
        .ok_or_else(|| Error::malformed(tag, format!("expected a sequence at depth {}", depth)))?;
    if items.len() != shape[depth] {
        return Err(Error::malformed(tag, format!(
            "ragged array: expected {} items at depth {}, found {}", shape[depth], depth, items.len()
        )));
    }
    if depth + 1 == shape.len() {
        for item in items {
            data.push(number(tag, item)?);
        }
    } else {
        for item in items {
            flatten(tag, item, shape, depth + 1, data)?;
        }
    }
    Ok(())
}

fn number(tag: &Tag, node: &Node) -> Result<f64> {
    match *node {
        Node::Int(v) => Ok(v as f64),
        Node::Float(v) => Ok(v),
        _ => Err(Error::malformed(tag, "expected a number")),
    }
}
