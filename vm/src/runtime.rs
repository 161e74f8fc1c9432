use std::cell::{RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use heap::{Heap, HeapSettings, RootProvider};
use object::{HeapFormat, HeapString, ValBox, STRING_INTERNED};
use parking_lot::Mutex;
use rand::Rng;
use syntax::NodeType;

use crate::behaviour;
use crate::handles::HandleScope;
use crate::spew::spew_enabled_from_env;
use crate::trace;

/// Handler-name slots indexed by [`NodeType`] discriminant; slot 0 is
/// unused.
pub const SYNTAX_NAME_SLOTS: usize = NodeType::IntegerExpr as usize + 1;

/// The canonical `@NodeType` identifier a syntactic form dispatches
/// through.
pub fn handler_name(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::File => "@File",
        NodeType::EmptyStmt => "@EmptyStmt",
        NodeType::ExprStmt => "@ExprStmt",
        NodeType::ReturnStmt => "@ReturnStmt",
        NodeType::IfStmt => "@IfStmt",
        NodeType::DefStmt => "@DefStmt",
        NodeType::ConstStmt => "@ConstStmt",
        NodeType::VarStmt => "@VarStmt",
        NodeType::LoopStmt => "@LoopStmt",
        NodeType::CallExpr => "@CallExpr",
        NodeType::DotExpr => "@DotExpr",
        NodeType::ArrowExpr => "@ArrowExpr",
        NodeType::PosExpr => "@Pos",
        NodeType::NegExpr => "@Neg",
        NodeType::AddExpr => "@Add",
        NodeType::SubExpr => "@Sub",
        NodeType::MulExpr => "@Mul",
        NodeType::DivExpr => "@Div",
        NodeType::ParenExpr => "@ParenExpr",
        NodeType::NameExpr => "@NameExpr",
        NodeType::IntegerExpr => "@Integer",
    }
}

/// Per-thread interpreter state: everything the collector must see.
pub struct ThreadState {
    /// Head of the stack-linked handle scope chain.
    pub handles_head: *mut HandleScope,
    /// The single live frame pointer the runtime holds; `Undefined`
    /// outside an execution.
    pub top_frame: ValBox,
    /// Interned handler names indexed by node type.
    pub syntax_names: [ValBox; SYNTAX_NAME_SLOTS],
    pub name_retcont: ValBox,
    pub name_dot: ValBox,
    pub name_arrow: ValBox,
    /// Interned heap strings; weak — entries die with their referents.
    pub intern_table: HashMap<String, ValBox>,
    /// Rooted scratch values for native code.
    pub scratch: Vec<ValBox>,
    /// Per-thread string-hash seed.
    pub spoiler: u64,
    pub spew_enabled: bool,
    pub error_message: Option<&'static str>,
}

impl ThreadState {
    fn new(spoiler: u64) -> Self {
        Self {
            handles_head: core::ptr::null_mut(),
            top_frame: ValBox::undefined(),
            syntax_names: [ValBox::undefined(); SYNTAX_NAME_SLOTS],
            name_retcont: ValBox::undefined(),
            name_dot: ValBox::undefined(),
            name_arrow: ValBox::undefined(),
            intern_table: HashMap::new(),
            scratch: Vec::new(),
            spoiler,
            spew_enabled: spew_enabled_from_env(),
            error_message: None,
        }
    }
}

impl RootProvider for ThreadState {
    fn visit_roots(&mut self, visitor: &mut dyn FnMut(&mut ValBox)) {
        let mut scope = self.handles_head;
        while !scope.is_null() {
            unsafe {
                (*scope).visit_roots(visitor);
                scope = (*scope).next_scope();
            }
        }
        visitor(&mut self.top_frame);
        for name in &mut self.syntax_names {
            visitor(name);
        }
        visitor(&mut self.name_retcont);
        visitor(&mut self.name_dot);
        visitor(&mut self.name_arrow);
        for value in &mut self.scratch {
            visitor(value);
        }
    }

    fn sweep_weak(&mut self, resolver: &mut dyn FnMut(ValBox) -> Option<ValBox>) {
        self.intern_table.retain(|_, value| match resolver(*value) {
            Some(updated) => {
                *value = updated;
                true
            }
            None => false,
        });
    }
}

/// Errors surfaced by the embedding API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    OutOfMemory,
}

impl core::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RuntimeError::OutOfMemory => write!(f, "out of memory"),
        }
    }
}

impl std::error::Error for RuntimeError {}

thread_local! {
    /// This thread's contexts, keyed by runtime id. A repeat
    /// registration from the same OS thread finds the live context
    /// here instead of creating a second one.
    static THREAD_CONTEXTS: RefCell<HashMap<u64, ThreadContextHandle>> =
        RefCell::new(HashMap::new());
}

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

/// One instance of the engine: a registry of thread contexts. Each
/// context carries exactly one execution; objects never cross between
/// them.
pub struct Runtime {
    id: u64,
    registry: Arc<Mutex<HashSet<ThreadId>>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
            registry: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The thread context for the current OS thread, created on first
    /// use. Idempotent per OS thread: a repeat call returns a handle
    /// to the same live context.
    pub fn register_thread(&self) -> Result<ThreadContextHandle, RuntimeError> {
        self.register_thread_with(HeapSettings::default())
    }

    /// As [`register_thread`](Self::register_thread); the settings
    /// apply only when this call actually creates the context.
    pub fn register_thread_with(
        &self,
        settings: HeapSettings,
    ) -> Result<ThreadContextHandle, RuntimeError> {
        let existing =
            THREAD_CONTEXTS.with(|contexts| contexts.borrow().get(&self.id).cloned());
        if let Some(handle) = existing {
            return Ok(handle);
        }

        let thread_id = std::thread::current().id();
        let cx = ThreadContext::new(Arc::clone(&self.registry), thread_id, settings)?;
        self.registry.lock().insert(thread_id);
        let handle = ThreadContextHandle {
            inner: Rc::new(RefCell::new(cx)),
        };
        THREAD_CONTEXTS.with(|contexts| {
            contexts.borrow_mut().insert(self.id, handle.clone());
        });
        Ok(handle)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the current thread's context.
///
/// Clones refer to the same context; the context itself sits behind
/// the shared cell and never moves, which the handle-scope chain's raw
/// state pointer relies on. Not sendable: contexts stay on the thread
/// that registered them.
#[derive(Clone)]
pub struct ThreadContextHandle {
    inner: Rc<RefCell<ThreadContext>>,
}

impl ThreadContextHandle {
    /// Exclusive access to the context. Panics if re-entered while a
    /// previous borrow is still live.
    pub fn borrow_mut(&self) -> RefMut<'_, ThreadContext> {
        self.inner.borrow_mut()
    }

    /// Run `f` with exclusive access to the context.
    pub fn with<R>(&self, f: impl FnOnce(&mut ThreadContext) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }
}

/// Holds everything one thread needs to run script: the heap and the
/// rooted interpreter state.
pub struct ThreadContext {
    pub heap: Heap,
    pub state: ThreadState,
    registry: Arc<Mutex<HashSet<ThreadId>>>,
    thread_id: ThreadId,
}

impl ThreadContext {
    fn new(
        registry: Arc<Mutex<HashSet<ThreadId>>>,
        thread_id: ThreadId,
        settings: HeapSettings,
    ) -> Result<Self, RuntimeError> {
        let heap = Heap::new(settings, trace::trace_object);
        let spoiler = rand::rng().random::<u64>();
        let mut cx = Self {
            heap,
            state: ThreadState::new(spoiler),
            registry,
            thread_id,
        };
        cx.init_names().ok_or(RuntimeError::OutOfMemory)?;
        Ok(cx)
    }

    fn init_names(&mut self) -> Option<()> {
        for raw in 1..SYNTAX_NAME_SLOTS {
            let node_type = NodeType::from_u16(raw as u16).expect("dense node types");
            let name = self.intern(handler_name(node_type))?;
            self.state.syntax_names[raw] = name;
        }
        self.state.name_retcont = self.intern("@retcont")?;
        self.state.name_dot = self.intern("@Dot")?;
        self.state.name_arrow = self.intern("@Arrow")?;
        Some(())
    }

    /// Allocate raw object memory in the hatchery. May collect; every
    /// live value must be reachable from the thread's roots.
    pub fn allocate_raw(&mut self, size: usize, traced: bool) -> Option<NonNull<u8>> {
        let ThreadContext { heap, state, .. } = self;
        heap.allocate(size, traced, state)
    }

    /// Write-barrier a heap container after storing into one of its
    /// fields.
    pub fn barrier(&mut self, container: ValBox) {
        if container.is_ref() {
            self.heap.record_write(container.ref_bits() as *mut u8);
        }
    }

    /// Canonicalize a string: short ASCII names become immediates, the
    /// rest intern into per-thread heap strings compared by pointer.
    pub fn intern(&mut self, s: &str) -> Option<ValBox> {
        if s.is_ascii() && s.len() <= 7 {
            return Some(ValBox::str8(s.as_bytes()));
        }
        if let Some(&value) = self.state.intern_table.get(s) {
            return Some(value);
        }
        let units = object::utf16_units(s);
        let value = crate::alloc::alloc_heap_string(self, &units)?;
        unsafe {
            value
                .as_mut::<HeapString>()
                .header
                .set_user_data(STRING_INTERNED);
        }
        self.state.intern_table.insert(s.to_string(), value);
        Some(value)
    }

    pub fn syntax_name(&self, node_type: NodeType) -> ValBox {
        self.state.syntax_names[node_type as usize]
    }

    pub fn set_internal_error(&mut self, message: &'static str) {
        if self.state.error_message.is_none() {
            self.state.error_message = Some(message);
        }
    }

    /// Diagnostic for the embedder after an `Error` result.
    pub fn take_internal_error(&mut self) -> Option<&'static str> {
        self.state.error_message.take()
    }

    /// A fresh global scope with the default syntactic handlers bound.
    pub fn make_global_scope(&mut self) -> Option<ValBox> {
        let hs = HandleScope::new(self);
        let scope = crate::alloc::alloc_scope(self, HeapFormat::GlobalScope, &[], 64)?;
        let scope_h = hs.pin(scope);
        behaviour::bind_syntax_handlers(self, scope_h.get())?;
        Some(scope_h.get())
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.thread_id);
    }
}
