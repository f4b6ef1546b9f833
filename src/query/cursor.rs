//! Lazy row cursors
//!
//! [`PathCursor`] walks a compiled path depth-first with an explicit stack of
//! frames. Each frame is a source of candidate rows plus the index of the
//! selector still to apply to them. Sources over many children fetch one
//! child per step, so work is proportional to how far the stream is pulled.

use crate::backend::{Backend, RowCursor};
use crate::error::{Error, Result};
use crate::path::{JsonPath, Selector};
use crate::types::{DataType, Row, RowId};
use std::rc::Rc;

/// Resolve Python-style slice bounds against a length
fn slice_bounds(len: i64, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<(i64, i64, i64)> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::UnsupportedOperation("slice step cannot be zero".to_string()));
    }
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |bound: i64| {
        if bound < 0 {
            (bound + len).max(lower)
        } else {
            bound.min(upper)
        }
    };
    let start = start.map(clamp).unwrap_or(if step > 0 { lower } else { upper });
    let stop = stop.map(clamp).unwrap_or(if step > 0 { upper } else { lower });
    Ok((start, stop, step))
}

/// Normalize a possibly negative position against a length
pub(crate) fn resolve_index(index: i64, len: u64) -> Option<u64> {
    let len = i64::try_from(len).ok()?;
    let position = if index < 0 { index + len } else { index };
    (0..len).contains(&position).then_some(position as u64)
}

/// Positions `start, start+step, ...` short of `stop` in a list
#[derive(Debug)]
struct Stride {
    list: RowId,
    next: i64,
    stop: i64,
    step: i64,
}

impl Stride {
    fn advance(&mut self, backend: &dyn Backend) -> Result<Option<Row>> {
        let in_range = if self.step > 0 {
            self.next < self.stop
        } else {
            self.next > self.stop
        };
        if !in_range {
            return Ok(None);
        }
        let row = backend.get_nth_child(self.list, self.next as u64)?;
        // A step past i64 range leaves the list behind
        self.next = self.next.checked_add(self.step).unwrap_or(self.stop);
        Ok(Some(row))
    }
}

/// Slice over a list's elements
#[derive(Debug)]
pub struct SliceCursor {
    stride: Stride,
}

impl SliceCursor {
    pub fn new(list: RowId, len: u64, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Result<Self> {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        let (next, stop, step) = slice_bounds(len, start, stop, step)?;
        Ok(SliceCursor {
            stride: Stride {
                list,
                next,
                stop,
                step,
            },
        })
    }
}

impl RowCursor for SliceCursor {
    fn advance(&mut self, backend: &dyn Backend) -> Result<Option<Row>> {
        self.stride.advance(backend)
    }
}

#[derive(Debug)]
enum Source {
    /// Candidates already resolved
    Rows(std::vec::IntoIter<Row>),
    /// Every structural value below a container; dict keys are looked through
    Children {
        parent: RowId,
        next: u64,
        len: u64,
        through_keys: bool,
    },
    Stride(Stride),
}

impl Source {
    fn advance(&mut self, backend: &dyn Backend) -> Result<Option<Row>> {
        match self {
            Source::Rows(rows) => Ok(rows.next()),
            Source::Children {
                parent,
                next,
                len,
                through_keys,
            } => {
                if *next >= *len {
                    return Ok(None);
                }
                let child = backend.get_nth_child(*parent, *next)?;
                *next += 1;
                if *through_keys {
                    backend.get_nth_child(child.id, 0).map(Some)
                } else {
                    Ok(Some(child))
                }
            }
            Source::Stride(stride) => stride.advance(backend),
        }
    }

    fn children(row: &Row) -> Option<Source> {
        row.data_type.is_container().then(|| Source::Children {
            parent: row.id,
            next: 0,
            len: row.count(),
            through_keys: row.data_type == DataType::Dict,
        })
    }
}

#[derive(Debug)]
struct Frame {
    source: Source,
    /// Index of the next selector to apply to rows from `source`
    step: usize,
}

/// Lazy evaluation of a compiled path against one subtree
#[derive(Debug)]
pub struct PathCursor {
    path: Rc<JsonPath>,
    start: Option<RowId>,
    stack: Vec<Frame>,
    one: bool,
    done: bool,
}

impl PathCursor {
    pub fn new(path: Rc<JsonPath>, start: RowId, one: bool) -> Self {
        PathCursor {
            path,
            start: Some(start),
            stack: Vec::new(),
            one,
            done: false,
        }
    }

    /// Rows matched by one direct lookup selector
    fn lookup(backend: &dyn Backend, selector: &Selector, row: &Row, out: &mut Vec<Row>) -> Result<()> {
        match (selector, row.data_type) {
            (Selector::Child(name), DataType::Dict) => {
                if let Some((_, value)) = backend.find_key(name, row.id)? {
                    out.push(backend.get_row(value)?.ok_or(Error::RowNotFound(value))?);
                }
            }
            (Selector::Index(index), DataType::List) => {
                if let Some(position) = resolve_index(*index, row.count()) {
                    out.push(backend.get_nth_child(row.id, position)?);
                }
            }
            (Selector::Union(items), _) => {
                for item in items {
                    Self::lookup(backend, item, row, out)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Push the frames produced by applying `selectors[step]` to `row`
    fn expand(&mut self, backend: &dyn Backend, row: Row, step: usize) -> Result<()> {
        let path = Rc::clone(&self.path);
        match &path.selectors()[step] {
            Selector::Descendant(inner) => {
                // Children re-apply this same step; the node's own matches sit on top
                if let Some(source) = Source::children(&row) {
                    self.stack.push(Frame { source, step });
                }
                self.expand_inner(backend, inner, row, step + 1)
            }
            selector => self.expand_inner(backend, selector, row, step + 1),
        }
    }

    /// Apply a selector that is not itself a descent, handing matches to `next_step`
    fn expand_inner(&mut self, backend: &dyn Backend, selector: &Selector, row: Row, next_step: usize) -> Result<()> {
        match selector {
            Selector::Wildcard => {
                if let Some(source) = Source::children(&row) {
                    self.stack.push(Frame { source, step: next_step });
                }
            }
            Selector::Slice { start, stop, step } => {
                if row.data_type == DataType::List {
                    let cursor = SliceCursor::new(row.id, row.count(), *start, *stop, *step)?;
                    self.stack.push(Frame {
                        source: Source::Stride(cursor.stride),
                        step: next_step,
                    });
                }
            }
            Selector::Descendant(inner) => {
                // `....x` collapses to a single descent
                self.expand_inner(backend, inner, row, next_step)?;
            }
            lookup => {
                let mut matches = Vec::new();
                Self::lookup(backend, lookup, &row, &mut matches)?;
                if !matches.is_empty() {
                    self.stack.push(Frame {
                        source: Source::Rows(matches.into_iter()),
                        step: next_step,
                    });
                }
            }
        }
        Ok(())
    }
}

impl RowCursor for PathCursor {
    fn advance(&mut self, backend: &dyn Backend) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        if let Some(start) = self.start.take() {
            let row = backend.get_row(start)?.ok_or(Error::RowNotFound(start))?;
            self.stack.push(Frame {
                source: Source::Rows(vec![row].into_iter()),
                step: 0,
            });
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.done = true;
                return Ok(None);
            };
            let step = frame.step;
            match frame.source.advance(backend)? {
                None => {
                    self.stack.pop();
                }
                Some(row) if step == self.path.selectors().len() => {
                    if self.one {
                        self.done = true;
                        self.stack.clear();
                    }
                    return Ok(Some(row));
                }
                Some(row) => self.expand(backend, row, step)?,
            }
        }
    }
}
