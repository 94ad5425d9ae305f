//! FanOut operator.
//!
//! Splits one input into several branches (one per `OR` arm). Every change
//! is published to every branch; the matching `FanIn` is told when a push
//! starts and finishes so it can forward a single copy.

use super::fan_in::FanIn;
use crate::change::Change;
use crate::node::Stream;
use crate::operator::{Downstream, FetchRequest, Input, OperatorKind, Output};
use crate::schema::SourceSchema;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

pub struct FanOut {
    input: Rc<dyn Input>,
    outputs: RefCell<Vec<Rc<dyn Output>>>,
    fan_in: RefCell<Option<Weak<FanIn>>>,
    destroy_count: Cell<usize>,
}

impl FanOut {
    pub fn new(input: Rc<dyn Input>) -> Rc<Self> {
        let fan_out = Rc::new(Self {
            input: input.clone(),
            outputs: RefCell::new(Vec::new()),
            fan_in: RefCell::new(None),
            destroy_count: Cell::new(0),
        });
        input.set_output(Downstream::of(&fan_out));
        fan_out
    }

    /// Links the fan-in that merges this fan-out's branches.
    pub(crate) fn set_fan_in(&self, fan_in: Weak<FanIn>) {
        *self.fan_in.borrow_mut() = Some(fan_in);
    }

    /// Number of registered branch outputs.
    pub fn output_count(&self) -> usize {
        self.outputs.borrow().len()
    }

    fn fan_in(&self) -> Option<Rc<FanIn>> {
        self.fan_in.borrow().as_ref().and_then(Weak::upgrade)
    }
}

impl Input for FanOut {
    fn schema(&self) -> Rc<SourceSchema> {
        self.input.schema()
    }

    fn fetch(&self, req: FetchRequest) -> Stream {
        self.input.fetch(req)
    }

    fn cleanup(&self, req: FetchRequest) -> Stream {
        self.input.cleanup(req)
    }

    /// Adds a branch. Unlike other operators a fan-out has many outputs.
    fn set_output(&self, output: Rc<dyn Output>) {
        self.outputs.borrow_mut().push(output);
    }

    /// Each branch destroys its input once; the upstream goes away with the
    /// last one.
    fn destroy(&self) {
        let outputs = self.output_count();
        let count = self.destroy_count.get() + 1;
        assert!(
            count <= outputs,
            "FanOut destroyed more times than it has outputs ({})",
            outputs
        );
        self.destroy_count.set(count);
        if count == outputs {
            self.input.destroy();
        }
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::FanOut
    }
}

impl Output for FanOut {
    fn push(&self, change: Change) {
        let fan_in = self.fan_in();
        if let Some(fan_in) = &fan_in {
            fan_in.fan_out_started_pushing();
        }
        let outputs = self.outputs.borrow().clone();
        for output in outputs {
            output.push(change.clone());
        }
        if let Some(fan_in) = &fan_in {
            fan_in.fan_out_done_pushing();
        }
    }
}
