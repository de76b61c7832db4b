//! Sequential op list decoding
//!
//! The [`Reader`] flattens an op list: macro bodies are skipped, calls are
//! followed into their target list and deferred calls run once the main list
//! is exhausted. Consumers only see the resulting linear sequence.

use std::ops::{Deref, Range};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::ops::{get_u32, OpType, Ops, Pc, Ref, AUX_LEN, CALL_LEN, MACRO_LEN};

/// A decoded operation
#[derive(Clone, Copy, Debug)]
pub struct EncodedOp<'r> {
    pub data: &'r [u8],
    pub refs: &'r [Ref],
}

impl EncodedOp<'_> {
    pub fn op_type(&self) -> OpType {
        OpType::from_u8(self.data[0]).unwrap_or_else(|| panic!("invalid opcode {}", self.data[0]))
    }
}

#[derive(Clone, Debug)]
enum ListRef<'a> {
    Root(&'a Ops),
    Shared(Arc<Ops>),
}

impl Deref for ListRef<'_> {
    type Target = Ops;

    fn deref(&self) -> &Ops {
        match self {
            ListRef::Root(ops) => ops,
            ListRef::Shared(ops) => ops,
        }
    }
}

#[derive(Debug)]
struct Frame<'a> {
    /// Where to continue once `end` is reached. `None` returns to deferred
    /// dispatch.
    ret: Option<(ListRef<'a>, Pc)>,
    end: Pc,
}

#[derive(Debug)]
struct DeferredCall<'a> {
    list: ListRef<'a>,
    start: Pc,
    end: Pc,
}

/// Reader of an op list
#[derive(Debug)]
pub struct Reader<'a> {
    list: Option<ListRef<'a>>,
    pc: Pc,
    stack: SmallVec<[Frame<'a>; 8]>,
    deferred: Vec<DeferredCall<'a>>,
    next_deferred: usize,
}

impl<'a> Reader<'a> {
    pub fn new(ops: &'a Ops) -> Self {
        Self {
            list: Some(ListRef::Root(ops)),
            pc: Pc::default(),
            stack: SmallVec::new(),
            deferred: Vec::new(),
            next_deferred: 0,
        }
    }

    /// Decode the next operation, or `None` when the list and every deferred
    /// call have been read.
    pub fn decode(&mut self) -> Option<EncodedOp<'_>> {
        let (data, refs) = self.advance()?;
        let list = self.list.as_deref()?;
        Some(EncodedOp {
            data: &list.data[data],
            refs: &list.refs[refs],
        })
    }

    fn advance(&mut self) -> Option<(Range<usize>, Range<usize>)> {
        let mut deferring = false;
        loop {
            if let Some(top) = self.stack.last() {
                if self.pc == top.end {
                    self.return_from_call();
                    continue;
                }
            }
            let Some(list) = self.list.as_ref() else {
                // Between lists: run the next deferred call, if any.
                let call = self.deferred.get(self.next_deferred)?;
                if self.next_deferred == 0 {
                    tracing::trace!(count = self.deferred.len(), "running deferred calls");
                }
                self.next_deferred += 1;
                let (list, start, end) = (call.list.clone(), call.start, call.end);
                self.stack.push(Frame { ret: None, end });
                self.list = Some(list);
                self.pc = start;
                continue;
            };
            if self.pc.data >= list.data.len() {
                if self.stack.is_empty() {
                    self.list = None;
                } else {
                    self.return_from_call();
                }
                continue;
            }

            let op = OpType::from_u8(list.data[self.pc.data])
                .unwrap_or_else(|| panic!("invalid opcode {}", list.data[self.pc.data]));
            let mut n = op.size();
            let nrefs = op.num_refs();
            let start = self.pc;
            match op {
                OpType::Defer => {
                    deferring = true;
                    self.pc = start.advance(op);
                    continue;
                }
                OpType::Aux => {
                    // Aux data always sits in a macro and runs to its end.
                    let block = self
                        .stack
                        .last()
                        .unwrap_or_else(|| panic!("aux op outside of a macro"));
                    n += block.end.data - start.data - AUX_LEN;
                }
                OpType::Call => {
                    let data = &list.data[start.data..start.data + CALL_LEN];
                    let call_start = Pc {
                        data: get_u32(&data[1..]) as usize,
                        refs: get_u32(&data[5..]) as usize,
                    };
                    let call_end = Pc {
                        data: get_u32(&data[9..]) as usize,
                        refs: get_u32(&data[13..]) as usize,
                    };
                    let target = match &list.refs[start.refs] {
                        Ref::List(ops) => ListRef::Shared(Arc::clone(ops)),
                        Ref::Local => list.clone(),
                        Ref::Image(_) => panic!("invalid op: call into an image"),
                    };
                    let ret_pc = start.advance(op);
                    if deferring {
                        deferring = false;
                        self.deferred.push(DeferredCall {
                            list: target,
                            start: call_start,
                            end: call_end,
                        });
                        self.pc = ret_pc;
                        continue;
                    }
                    let ret = self.list.take().map(|l| (l, ret_pc));
                    self.stack.push(Frame { ret, end: call_end });
                    self.list = Some(target);
                    self.pc = call_start;
                    continue;
                }
                OpType::Macro => {
                    let data = &list.data[start.data..start.data + MACRO_LEN];
                    let end = Pc {
                        data: get_u32(&data[1..]) as usize,
                        refs: get_u32(&data[5..]) as usize,
                    };
                    self.pc = if end != Pc::default() {
                        end
                    } else {
                        // An unfinished macro swallows the rest of the list.
                        list.pc()
                    };
                    continue;
                }
                _ => {}
            }
            self.pc = Pc {
                data: start.data + n,
                refs: start.refs + nrefs,
            };
            return Some((start.data..start.data + n, start.refs..start.refs + nrefs));
        }
    }

    fn return_from_call(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        match frame.ret {
            Some((list, pc)) => {
                self.list = Some(list);
                self.pc = pc;
            }
            None => self.list = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{defer, MacroOp, TransformOp};
    use crate::paint::{ColorOp, PaintOp};
    use strata_core::{Nrgba, Point};

    fn op_types(ops: &Ops) -> Vec<OpType> {
        let mut r = Reader::new(ops);
        let mut out = Vec::new();
        while let Some(op) = r.decode() {
            out.push(op.op_type());
        }
        out
    }

    #[test]
    fn test_macro_body_is_skipped() {
        let mut ops = Ops::new();
        let m = MacroOp::record(&mut ops);
        ColorOp::new(Nrgba::BLACK).add(&mut ops);
        let _call = m.stop(&mut ops);
        PaintOp.add(&mut ops);
        assert_eq!(op_types(&ops), vec![OpType::Paint]);
    }

    #[test]
    fn test_call_runs_macro() {
        let mut ops = Ops::new();
        let m = MacroOp::record(&mut ops);
        ColorOp::new(Nrgba::BLACK).add(&mut ops);
        let call = m.stop(&mut ops);
        call.add(&mut ops);
        PaintOp.add(&mut ops);
        call.add(&mut ops);
        assert_eq!(
            op_types(&ops),
            vec![OpType::Color, OpType::Paint, OpType::Color]
        );
    }

    #[test]
    fn test_deferred_runs_last() {
        let mut ops = Ops::new();
        let m = MacroOp::record(&mut ops);
        ColorOp::new(Nrgba::WHITE).add(&mut ops);
        let call = m.stop(&mut ops);
        TransformOp::offset(Point::new(1.0, 1.0)).add(&mut ops);
        defer(&mut ops, call);
        PaintOp.add(&mut ops);
        assert_eq!(
            op_types(&ops),
            vec![
                OpType::Transform,
                OpType::Save,
                OpType::Paint,
                OpType::Load,
                OpType::Color
            ]
        );
    }
}
