//! Filter operator.

use crate::change::Change;
use crate::node::Stream;
use crate::operator::{Downstream, FetchRequest, Input, OperatorKind, Output, OutputSlot, Predicate};
use crate::schema::SourceSchema;
use std::rc::Rc;

/// What a filter re-checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    /// Filter both fetched and pushed rows.
    All,
    /// The source already applied the predicate to fetches; only pushes are
    /// filtered.
    PushOnly,
}

/// Passes through rows matching a predicate.
pub struct Filter {
    input: Rc<dyn Input>,
    mode: FilterMode,
    predicate: Predicate,
    output: OutputSlot,
}

impl Filter {
    pub fn new(input: Rc<dyn Input>, mode: FilterMode, predicate: Predicate) -> Rc<Self> {
        let filter = Rc::new(Self {
            input: input.clone(),
            mode,
            predicate,
            output: OutputSlot::new(),
        });
        input.set_output(Downstream::of(&filter));
        filter
    }

    fn filtered(&self, stream: Stream) -> Stream {
        match self.mode {
            FilterMode::PushOnly => stream,
            FilterMode::All => {
                let predicate = self.predicate.clone();
                Box::new(stream.filter(move |node| predicate(&node.row)))
            }
        }
    }
}

impl Input for Filter {
    fn schema(&self) -> Rc<SourceSchema> {
        self.input.schema()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.filtered(self.input.fetch(req))
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.filtered(self.input.cleanup(req))
    }

    fn set_output(&self, output: Rc<dyn Output>) {
        self.output.set(output);
    }

    fn destroy(&self) {
        self.input.destroy();
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Filter
    }
}

impl Output for Filter {
    fn push(&self, change: Change) {
        if (self.predicate)(change.row()) {
            self.output.push(change);
        }
    }
}
