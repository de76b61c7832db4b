//! General operations: transforms, macros, deferral and state snapshots

use std::sync::Arc;

use strata_core::{Affine2D, Point};

use crate::ops::{
    put_f32, put_u32, OpType, Ops, Pc, Ref, StackId, StackKind, DEFER_LEN, LOAD_LEN, MACRO_LEN,
    POP_TRANSFORM_LEN, PROFILE_LEN, SAVE_LEN, TRANSFORM_LEN,
};

/// Transformation that can be added to, or pushed on, the transform stack
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformOp {
    t: Affine2D,
}

/// A [`TransformOp`] pushed on the transform stack
#[must_use = "a pushed transform must be popped"]
#[derive(Debug)]
pub struct TransformStack {
    id: StackId,
    macro_id: u32,
}

impl TransformOp {
    pub fn offset(o: Point) -> Self {
        Self {
            t: Affine2D::IDENTITY.offset(o),
        }
    }

    pub fn affine(t: Affine2D) -> Self {
        Self { t }
    }

    /// Save the current transform and then multiply it by this one.
    pub fn push(&self, o: &mut Ops) -> TransformStack {
        let (id, macro_id) = o.push_op(StackKind::Transform);
        self.encode(o, true);
        TransformStack { id, macro_id }
    }

    /// Multiply the current transform without saving it.
    pub fn add(&self, o: &mut Ops) {
        self.encode(o, false);
    }

    fn encode(&self, o: &mut Ops, push: bool) {
        let data = o.write(TRANSFORM_LEN);
        data[0] = OpType::Transform as u8;
        data[1] = push as u8;
        let (sx, hx, ox, hy, sy, oy) = self.t.elems();
        for (i, v) in [sx, hx, ox, hy, sy, oy].into_iter().enumerate() {
            put_f32(&mut data[2 + 4 * i..], v);
        }
    }
}

impl TransformStack {
    /// Restore the transform saved by the matching push.
    pub fn pop(self, o: &mut Ops) {
        o.pop_op(StackKind::Transform, self.id, self.macro_id);
        o.write(POP_TRANSFORM_LEN)[0] = OpType::PopTransform as u8;
    }
}

/// An in-progress macro recording
#[must_use = "a recording must be stopped"]
#[derive(Debug)]
pub struct MacroOp {
    list: u64,
    id: StackId,
    pc: Pc,
}

/// Invocation of a recorded macro
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallOp {
    list: u64,
    start: Pc,
    end: Pc,
}

impl MacroOp {
    /// Start recording. Operations added until [`MacroOp::stop`] are skipped
    /// by readers and only run through the returned [`CallOp`].
    pub fn record(o: &mut Ops) -> MacroOp {
        let id = o.macro_stack.push();
        let pc = o.pc();
        o.write(MACRO_LEN);
        o.fill_macro(pc);
        MacroOp {
            list: o.id(),
            id,
            pc,
        }
    }

    pub fn stop(self, o: &mut Ops) -> CallOp {
        assert_eq!(o.id(), self.list, "macro stopped in a different op list");
        o.macro_stack.pop(self.id);
        o.fill_macro(self.pc);
        CallOp {
            list: self.list,
            start: self.pc.advance(OpType::Macro),
            end: o.pc(),
        }
    }
}

impl CallOp {
    /// Invoke the macro from the list it was recorded in.
    pub fn add(&self, o: &mut Ops) {
        assert_eq!(
            o.id(),
            self.list,
            "macro recorded in another op list; use add_shared"
        );
        o.add_call(Ref::Local, self.start, self.end);
    }

    /// Invoke the macro recorded in the frozen list `source` from `o`.
    pub fn add_shared(&self, source: &Arc<Ops>, o: &mut Ops) {
        assert_eq!(source.id(), self.list, "macro not recorded in source list");
        if source.id() == o.id() {
            o.add_call(Ref::Local, self.start, self.end);
        } else {
            o.add_call(Ref::List(Arc::clone(source)), self.start, self.end);
        }
    }
}

/// Run `call` after every other operation has been read, including earlier
/// deferred calls. The transform in effect at this point is restored first;
/// other state is reset.
pub fn defer(o: &mut Ops, call: CallOp) {
    let state = StateOp::save(o);
    let m = MacroOp::record(o);
    state.load(o);
    call.add(o);
    let wrapped = m.stop(o);
    o.write(DEFER_LEN)[0] = OpType::Defer as u8;
    wrapped.add(o);
}

/// Saved transform snapshot, restorable at any later point of the list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateOp {
    id: u32,
    list: u64,
}

impl StateOp {
    pub fn save(o: &mut Ops) -> StateOp {
        let id = o.next_state_id();
        let data = o.write(SAVE_LEN);
        data[0] = OpType::Save as u8;
        put_u32(&mut data[1..], id);
        StateOp { id, list: o.id() }
    }

    pub fn load(&self, o: &mut Ops) {
        assert_eq!(o.id(), self.list, "state loaded in a different op list");
        let data = o.write(LOAD_LEN);
        data[0] = OpType::Load as u8;
        put_u32(&mut data[1..], self.id);
    }
}

/// Requests GPU timing for the frames rendering this list
#[derive(Clone, Copy, Debug, Default)]
pub struct ProfileOp;

impl ProfileOp {
    pub fn add(&self, o: &mut Ops) {
        o.write(PROFILE_LEN)[0] = OpType::Profile as u8;
    }
}
