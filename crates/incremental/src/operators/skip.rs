//! Skip operator.
//!
//! Drops every row up to a bound row. Used to continue a paginated query
//! from where the previous page ended: the position is a row, not a count,
//! so it stays correct as rows before it come and go.

use crate::change::Change;
use crate::node::{empty_stream, Stream};
use crate::operator::{
    Basis, Downstream, FetchRequest, Input, OperatorKind, Output, OutputSlot, Start,
};
use crate::schema::SourceSchema;
use rill_core::Row;
use std::cmp::Ordering;
use std::rc::Rc;

/// Where the skipped prefix ends.
#[derive(Clone, Debug, PartialEq)]
pub struct SkipBound {
    pub row: Row,
    /// Also skip the bound row itself.
    pub exclusive: bool,
}

pub struct Skip {
    input: Rc<dyn Input>,
    bound: SkipBound,
    schema: Rc<SourceSchema>,
    output: OutputSlot,
}

impl Skip {
    pub fn new(input: Rc<dyn Input>, bound: SkipBound) -> Rc<Self> {
        let skip = Rc::new(Self {
            schema: input.schema(),
            input: input.clone(),
            bound,
            output: OutputSlot::new(),
        });
        input.set_output(Downstream::of(&skip));
        skip
    }

    fn should_be_present(schema: &SourceSchema, bound: &SkipBound, row: &Row) -> bool {
        match schema.compare_rows(&bound.row, row) {
            Ordering::Less => true,
            Ordering::Equal => !bound.exclusive,
            Ordering::Greater => false,
        }
    }

    /// Rewrites the start of a request so it never reaches into the skipped
    /// prefix. `None` means the request cannot yield anything.
    fn start_for(&self, req: &FetchRequest) -> Option<Option<Start>> {
        let bound_start = Start {
            row: self.bound.row.clone(),
            basis: if self.bound.exclusive {
                Basis::After
            } else {
                Basis::At
            },
        };
        let Some(start) = &req.start else {
            return Some(if req.reverse { None } else { Some(bound_start) });
        };

        let cmp = self.schema.compare_rows(&self.bound.row, &start.row);
        if !req.reverse {
            return Some(Some(match cmp {
                Ordering::Greater => bound_start,
                Ordering::Equal if self.bound.exclusive || start.basis == Basis::After => Start {
                    row: self.bound.row.clone(),
                    basis: Basis::After,
                },
                Ordering::Equal => bound_start,
                Ordering::Less => start.clone(),
            }));
        }

        match cmp {
            Ordering::Greater => None,
            Ordering::Equal if !self.bound.exclusive && start.basis == Basis::At => {
                Some(Some(start.clone()))
            }
            Ordering::Equal => None,
            Ordering::Less => Some(Some(start.clone())),
        }
    }

    fn stream(&self, req: FetchRequest, cleanup: bool) -> Stream {
        let Some(start) = self.start_for(&req) else {
            return empty_stream();
        };
        let reverse = req.reverse;
        let req = FetchRequest { start, ..req };
        let nodes = if cleanup {
            self.input.cleanup(req)
        } else {
            self.input.fetch(req)
        };
        if !reverse {
            return nodes;
        }
        let schema = self.schema.clone();
        let bound = self.bound.clone();
        Box::new(nodes.take_while(move |node| Self::should_be_present(&schema, &bound, &node.row)))
    }
}

impl Input for Skip {
    fn schema(&self) -> Rc<SourceSchema> {
        self.schema.clone()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.stream(req, false)
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.stream(req, true)
    }

    fn set_output(&self, output: Rc<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        self.input.destroy();
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Skip
    }
}

impl Output for Skip {
    fn push(&self, change: Change) {
        if Self::should_be_present(&self.schema, &self.bound, change.row()) {
            self.output.push(change);
        }
    }
}
