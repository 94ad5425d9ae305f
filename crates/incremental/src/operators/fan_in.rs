//! FanIn operator.
//!
//! Merges the branches of a `FanOut` back into one ordered input. A row that
//! satisfies several branches is still produced only once, both when
//! fetching and when pushing.

use super::fan_out::FanOut;
use crate::change::Change;
use crate::node::{Node, Stream};
use crate::operator::{Downstream, FetchRequest, Input, OperatorKind, Output, OutputSlot};
use crate::schema::SourceSchema;
use std::cell::Cell;
use std::cmp::Ordering;
use std::iter::Peekable;
use std::rc::Rc;

pub struct FanIn {
    branches: Vec<Rc<dyn Input>>,
    schema: Rc<SourceSchema>,
    /// Inside a fan-out push.
    pushing: Cell<bool>,
    /// A branch already forwarded the current fan-out push.
    forwarded: Cell<bool>,
    output: OutputSlot,
}

impl FanIn {
    pub fn new(fan_out: &Rc<FanOut>, branches: Vec<Rc<dyn Input>>) -> Rc<Self> {
        let fan_in = Rc::new(Self {
            schema: fan_out.schema(),
            branches,
            pushing: Cell::new(false),
            forwarded: Cell::new(false),
            output: OutputSlot::new(),
        });
        for branch in &fan_in.branches {
            branch.set_output(Downstream::of(&fan_in));
        }
        fan_out.set_fan_in(Rc::downgrade(&fan_in));
        fan_in
    }

    pub(crate) fn fan_out_started_pushing(&self) {
        assert!(!self.pushing.get(), "FanOut push already in progress");
        self.pushing.set(true);
        self.forwarded.set(false);
    }

    pub(crate) fn fan_out_done_pushing(&self) {
        self.pushing.set(false);
    }

    fn merge(&self, req: FetchRequest, cleanup: bool) -> Stream {
        let streams = self
            .branches
            .iter()
            .map(|branch| {
                let req = req.clone();
                if cleanup {
                    branch.cleanup(req).peekable()
                } else {
                    branch.fetch(req).peekable()
                }
            })
            .collect();
        Box::new(MergeStreams {
            streams,
            schema: self.schema.clone(),
            reverse: req.reverse,
        })
    }
}

impl Input for FanIn {
    fn schema(&self) -> Rc<SourceSchema> {
        self.schema.clone()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.merge(req, false)
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.merge(req, true)
    }

    fn set_output(&self, output: Rc<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        for branch in &self.branches {
            branch.destroy();
        }
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::FanIn
    }
}

impl Output for FanIn {
    fn push(&self, change: Change) {
        assert!(
            self.pushing.get(),
            "FanIn received a push outside of a FanOut push"
        );
        if self.forwarded.replace(true) {
            return;
        }
        self.output.push(change);
    }
}

/// K-way merge of branch streams sharing one order.
struct MergeStreams {
    streams: Vec<Peekable<Stream>>,
    schema: Rc<SourceSchema>,
    reverse: bool,
}

impl Iterator for MergeStreams {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        let schema = &self.schema;
        let reverse = self.reverse;
        let mut best: Option<usize> = None;
        for i in 0..self.streams.len() {
            let Some(candidate) = self.streams[i].peek().map(|n| n.row.clone()) else {
                continue;
            };
            let better = match best {
                None => true,
                Some(b) => {
                    let Some(current) = self.streams[b].peek() else {
                        continue;
                    };
                    let ord = schema.compare_rows(&candidate, &current.row);
                    if reverse {
                        ord == Ordering::Greater
                    } else {
                        ord == Ordering::Less
                    }
                }
            };
            if better {
                best = Some(i);
            }
        }

        let node = self.streams[best?].next()?;
        // Drop the same row from the other branches.
        for stream in &mut self.streams {
            while stream
                .peek()
                .map_or(false, |n| schema.compare_rows(&n.row, &node.row) == Ordering::Equal)
            {
                stream.next();
            }
        }
        Some(node)
    }
}
