//! Per-format edge enumeration for the collector.
//!
//! One enumerator serves both the scan and the update direction: the
//! visitor receives every heap-valued slot by mutable reference and
//! may rewrite it in place during relocation. Leaf formats never get
//! here.

use object::{
    BoxArray, DictEntry, HashObject, HeapFormat, HeapHeader, PackedSyntaxTree,
    PropertyDict, ValBox,
};

use crate::frame::{
    BlockSyntaxFrame, CallExprSyntaxFrame, DotExprSyntaxFrame, EntryFrame,
    FileSyntaxFrame, FrameKind, InvokeApplicativeFrame, InvokeOperativeFrame,
    InvokeSyntaxNodeFrame, NativeCallResumeFrame, ReturnStmtSyntaxFrame,
    TerminalFrame, VarSyntaxFrame,
};
use crate::function::{FunctionObject, ScriptedFunction};
use crate::objects::{Continuation, Exception, LookupState, SlistNode, SyntaxNode};

/// Visit every heap-valued field of the object at `obj`.
///
/// # Safety
///
/// `obj` must point to a valid, live heap object with a valid header.
pub unsafe fn trace_object(obj: *mut u8, visitor: &mut dyn FnMut(&mut ValBox)) {
    let header = &*(obj as *const HeapHeader);
    match header.format() {
        HeapFormat::HeapDouble
        | HeapFormat::HeapString
        | HeapFormat::U32Array
        | HeapFormat::NativeFunction => {
            // Leaf formats carry no references.
        }
        HeapFormat::BoxArray => {
            let arr = &*(obj as *const BoxArray);
            let base = (obj as *mut ValBox).add(2);
            for i in 0..arr.len() {
                visitor(&mut *base.add(i));
            }
        }
        HeapFormat::PackedSyntaxTree => {
            let pst = &mut *(obj as *mut PackedSyntaxTree);
            visitor(&mut pst.data);
            visitor(&mut pst.constants);
        }
        HeapFormat::SyntaxNode => {
            let node = &mut *(obj as *mut SyntaxNode);
            visitor(&mut node.pst);
        }
        HeapFormat::PropertyDict => {
            let dict = &*(obj as *const PropertyDict);
            let capacity = dict.capacity();
            // Entries start right after the fixed prefix.
            let entries =
                (obj as *mut u8).add(size_of::<PropertyDict>()) as *mut DictEntry;
            for i in 0..capacity {
                let entry = &mut *entries.add(i);
                if entry.name.is_valid() {
                    visitor(&mut entry.name);
                    visitor(&mut entry.value);
                    visitor(&mut entry.aux);
                }
            }
        }
        HeapFormat::CallScope | HeapFormat::ModuleScope | HeapFormat::GlobalScope => {
            let scope = &mut *(obj as *mut HashObject);
            visitor(&mut scope.delegates);
            visitor(&mut scope.dict);
        }
        HeapFormat::LookupState => {
            let state = &mut *(obj as *mut LookupState);
            visitor(&mut state.receiver);
            visitor(&mut state.name);
            visitor(&mut state.holder);
        }
        HeapFormat::ScriptedFunction => {
            let func = &mut *(obj as *mut ScriptedFunction);
            visitor(&mut func.pst);
            visitor(&mut func.scope_chain);
        }
        HeapFormat::FunctionObject => {
            let func = &mut *(obj as *mut FunctionObject);
            visitor(&mut func.base.delegates);
            visitor(&mut func.base.dict);
            visitor(&mut func.func);
            visitor(&mut func.receiver);
            visitor(&mut func.lookup_state);
        }
        HeapFormat::SlistNode => {
            let node = &mut *(obj as *mut SlistNode);
            visitor(&mut node.value);
            visitor(&mut node.next);
        }
        HeapFormat::Exception => {
            let exception = &*(obj as *const Exception);
            let count = exception.num_args();
            let base = (obj as *mut u8).add(size_of::<Exception>()) as *mut ValBox;
            for i in 0..count {
                visitor(&mut *base.add(i));
            }
        }
        HeapFormat::Continuation => {
            let continuation = &mut *(obj as *mut Continuation);
            visitor(&mut continuation.frame);
        }
        HeapFormat::Frame => trace_frame(obj, header.user_data(), visitor),
    }
}

unsafe fn trace_frame(
    obj: *mut u8,
    kind: u8,
    visitor: &mut dyn FnMut(&mut ValBox),
) {
    match FrameKind::from_u8(kind) {
        FrameKind::Terminal => {
            let frame = &mut *(obj as *mut TerminalFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.result_value);
            visitor(&mut frame.exc_frame);
            visitor(&mut frame.exc_exception);
        }
        FrameKind::Entry => {
            let frame = &mut *(obj as *mut EntryFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.syntax_node);
            visitor(&mut frame.scope);
        }
        FrameKind::InvokeSyntaxNode => {
            let frame = &mut *(obj as *mut InvokeSyntaxNodeFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.entry);
            visitor(&mut frame.syntax_node);
        }
        FrameKind::FileSyntax => {
            let frame = &mut *(obj as *mut FileSyntaxFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.entry);
            visitor(&mut frame.syntax_node);
        }
        FrameKind::BlockSyntax => {
            let frame = &mut *(obj as *mut BlockSyntaxFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.entry);
            visitor(&mut frame.syntax_node);
        }
        FrameKind::ReturnStmtSyntax => {
            let frame = &mut *(obj as *mut ReturnStmtSyntaxFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.entry);
            visitor(&mut frame.syntax_node);
        }
        FrameKind::VarSyntax => {
            let frame = &mut *(obj as *mut VarSyntaxFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.entry);
            visitor(&mut frame.syntax_node);
            visitor(&mut frame.last_value);
        }
        FrameKind::CallExprSyntax => {
            let frame = &mut *(obj as *mut CallExprSyntaxFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.entry);
            visitor(&mut frame.syntax_node);
            visitor(&mut frame.callee);
            visitor(&mut frame.callee_func);
            visitor(&mut frame.operands);
        }
        FrameKind::InvokeApplicative => {
            let frame = &mut *(obj as *mut InvokeApplicativeFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.callee);
            visitor(&mut frame.callee_func);
            visitor(&mut frame.operands);
        }
        FrameKind::InvokeOperative => {
            let frame = &mut *(obj as *mut InvokeOperativeFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.callee);
            visitor(&mut frame.callee_func);
            visitor(&mut frame.syntax_node);
        }
        FrameKind::DotExprSyntax => {
            let frame = &mut *(obj as *mut DotExprSyntaxFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.entry);
            visitor(&mut frame.syntax_node);
        }
        FrameKind::NativeCallResume => {
            let frame = &mut *(obj as *mut NativeCallResumeFrame);
            visitor(&mut frame.core.parent);
            visitor(&mut frame.lookup_state);
            visitor(&mut frame.caller_scope);
            visitor(&mut frame.callee_func);
            visitor(&mut frame.receiver);
            visitor(&mut frame.eval_scope);
            visitor(&mut frame.syntax_node);
            visitor(&mut frame.resume_state);
        }
    }
}
