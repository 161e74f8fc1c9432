/// Syntactic node kinds. The low 12 bits of a node's first word name
/// its type; the high 20 bits are the node-specific `extra` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NodeType {
    File = 1,
    EmptyStmt,
    ExprStmt,
    ReturnStmt,
    IfStmt,
    DefStmt,
    ConstStmt,
    VarStmt,
    LoopStmt,
    CallExpr,
    DotExpr,
    ArrowExpr,
    PosExpr,
    NegExpr,
    AddExpr,
    SubExpr,
    MulExpr,
    DivExpr,
    ParenExpr,
    NameExpr,
    IntegerExpr,
}

pub const TYPE_BITS: u32 = 12;
pub const TYPE_MASK: u32 = (1 << TYPE_BITS) - 1;
pub const MAX_EXTRA: u32 = (1 << 20) - 1;

impl NodeType {
    pub fn from_u16(raw: u16) -> Option<Self> {
        if (1..=NodeType::IntegerExpr as u16).contains(&raw) {
            // SAFETY: raw is within the contiguous discriminant range.
            Some(unsafe { core::mem::transmute::<u16, NodeType>(raw) })
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeType::File => "File",
            NodeType::EmptyStmt => "EmptyStmt",
            NodeType::ExprStmt => "ExprStmt",
            NodeType::ReturnStmt => "ReturnStmt",
            NodeType::IfStmt => "IfStmt",
            NodeType::DefStmt => "DefStmt",
            NodeType::ConstStmt => "ConstStmt",
            NodeType::VarStmt => "VarStmt",
            NodeType::LoopStmt => "LoopStmt",
            NodeType::CallExpr => "CallExpr",
            NodeType::DotExpr => "DotExpr",
            NodeType::ArrowExpr => "ArrowExpr",
            NodeType::PosExpr => "PosExpr",
            NodeType::NegExpr => "NegExpr",
            NodeType::AddExpr => "AddExpr",
            NodeType::SubExpr => "SubExpr",
            NodeType::MulExpr => "MulExpr",
            NodeType::DivExpr => "DivExpr",
            NodeType::ParenExpr => "ParenExpr",
            NodeType::NameExpr => "NameExpr",
            NodeType::IntegerExpr => "IntegerExpr",
        }
    }
}

#[inline]
pub fn pack_node_word(node_type: NodeType, extra: u32) -> u32 {
    debug_assert!(extra <= MAX_EXTRA);
    node_type as u32 | (extra << TYPE_BITS)
}

/// Zero-copy cursor over a node in the packed text.
///
/// Variable-arity nodes store a table of relative offsets after the
/// header word; `indirect_at(i)` resolves the child whose offset is
/// stored at word `i` by adding the stored relative to the cursor.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    data: &'a [u32],
    pub offset: usize,
}

impl<'a> NodeRef<'a> {
    pub fn new(data: &'a [u32], offset: usize) -> Self {
        debug_assert!(offset < data.len());
        Self { data, offset }
    }

    #[inline(always)]
    pub fn word(self, idx: usize) -> u32 {
        self.data[self.offset + idx]
    }

    pub fn node_type(self) -> Option<NodeType> {
        NodeType::from_u16((self.word(0) & TYPE_MASK) as u16)
    }

    #[inline(always)]
    pub fn extra(self) -> u32 {
        self.word(0) >> TYPE_BITS
    }

    #[inline(always)]
    pub fn at(self, idx: usize) -> NodeRef<'a> {
        NodeRef::new(self.data, self.offset + idx)
    }

    #[inline(always)]
    pub fn indirect_at(self, idx: usize) -> NodeRef<'a> {
        self.at(idx + self.word(idx) as usize)
    }

    // ── File ───────────────────────────────────────────────────────
    // { <NumStatements + Type>; StmtOffset_1..N-1; Stmt_0; ...; Stmt_N-1 }

    pub fn file_num_statements(self) -> usize {
        self.extra() as usize
    }

    pub fn file_statement(self, idx: usize) -> NodeRef<'a> {
        debug_assert!(idx < self.file_num_statements());
        if idx == 0 {
            self.at(self.file_num_statements())
        } else {
            self.indirect_at(idx)
        }
    }

    // ── ExprStmt / ParenExpr / PosExpr / NegExpr ───────────────────

    pub fn subexpression(self) -> NodeRef<'a> {
        self.at(1)
    }

    // ── ReturnStmt ─────────────────────────────────────────────────

    pub fn return_has_expression(self) -> bool {
        self.extra() & 1 != 0
    }

    pub fn return_expression(self) -> NodeRef<'a> {
        debug_assert!(self.return_has_expression());
        self.at(1)
    }

    // ── IfStmt ─────────────────────────────────────────────────────
    // { <NumElsifs | HasElse + Type>; IfBlockOffset;
    //   (ElsifCondOffset; ElsifBlockOffset)*; ElseBlockOffset?;
    //   IfCond; SizedIfBlock; (ElsifCond; SizedElsifBlock)*; SizedElseBlock? }

    pub fn if_num_elsifs(self) -> usize {
        (self.extra() >> 1) as usize
    }

    pub fn if_has_else(self) -> bool {
        self.extra() & 1 != 0
    }

    pub fn if_cond(self) -> NodeRef<'a> {
        self.at(2 + self.if_num_elsifs() * 2 + self.if_has_else() as usize)
    }

    pub fn if_block(self) -> SizedBlockRef<'a> {
        let target = self.indirect_at(1);
        SizedBlockRef::new(self.data, target.offset)
    }

    pub fn if_elsif_cond(self, idx: usize) -> NodeRef<'a> {
        debug_assert!(idx < self.if_num_elsifs());
        self.indirect_at(2 + idx * 2)
    }

    pub fn if_elsif_block(self, idx: usize) -> SizedBlockRef<'a> {
        debug_assert!(idx < self.if_num_elsifs());
        let target = self.indirect_at(3 + idx * 2);
        SizedBlockRef::new(self.data, target.offset)
    }

    pub fn if_else_block(self) -> SizedBlockRef<'a> {
        debug_assert!(self.if_has_else());
        let target = self.indirect_at(2 + self.if_num_elsifs() * 2);
        SizedBlockRef::new(self.data, target.offset)
    }

    // ── DefStmt ────────────────────────────────────────────────────
    // { <NumParams + Type>; NameCid; ParamCid_1..N; SizedBodyBlock }

    pub fn def_num_params(self) -> usize {
        self.extra() as usize
    }

    pub fn def_name_cid(self) -> u32 {
        self.word(1)
    }

    pub fn def_param_cid(self, idx: usize) -> u32 {
        debug_assert!(idx < self.def_num_params());
        self.word(2 + idx)
    }

    pub fn def_body_block(self) -> SizedBlockRef<'a> {
        SizedBlockRef::new(self.data, self.offset + 2 + self.def_num_params())
    }

    // ── VarStmt / ConstStmt ────────────────────────────────────────
    // { <NumBindings + Type>; (VarnameCid; VarexprOffset)*; VarExprs }
    // A zero VarexprOffset means the binding has no initializer.

    pub fn var_num_bindings(self) -> usize {
        self.extra() as usize
    }

    pub fn var_name_cid(self, idx: usize) -> u32 {
        debug_assert!(idx < self.var_num_bindings());
        self.word(1 + idx * 2)
    }

    pub fn var_has_init(self, idx: usize) -> bool {
        debug_assert!(idx < self.var_num_bindings());
        self.word(2 + idx * 2) > 0
    }

    pub fn var_init(self, idx: usize) -> NodeRef<'a> {
        debug_assert!(self.var_has_init(idx));
        self.indirect_at(2 + idx * 2)
    }

    // ── LoopStmt ───────────────────────────────────────────────────
    // { <NumStmts + Type>; Block }

    pub fn loop_body(self) -> BlockRef<'a> {
        BlockRef::new(self.data, self.offset + 1, self.extra() as usize)
    }

    // ── CallExpr ───────────────────────────────────────────────────
    // { <NumArgs + Type>; ArgOffset_1..N; CalleeExpr; ArgExpr_1..N }

    pub fn call_num_args(self) -> usize {
        self.extra() as usize
    }

    pub fn call_callee(self) -> NodeRef<'a> {
        self.at(1 + self.call_num_args())
    }

    pub fn call_arg(self, idx: usize) -> NodeRef<'a> {
        debug_assert!(idx < self.call_num_args());
        self.indirect_at(1 + idx)
    }

    // ── DotExpr / ArrowExpr ────────────────────────────────────────
    // { <Type>; NameCid; TargetExpr }

    pub fn access_name_cid(self) -> u32 {
        self.word(1)
    }

    pub fn access_target(self) -> NodeRef<'a> {
        self.at(2)
    }

    // ── AddExpr / SubExpr / MulExpr / DivExpr ──────────────────────
    // { <Type>; RhsOffset; Lhs; Rhs }

    pub fn binary_lhs(self) -> NodeRef<'a> {
        self.at(2)
    }

    pub fn binary_rhs(self) -> NodeRef<'a> {
        self.indirect_at(1)
    }

    // ── NameExpr / IntegerExpr ─────────────────────────────────────

    pub fn name_cid(self) -> u32 {
        self.word(1)
    }

    pub fn integer_value(self) -> i32 {
        self.word(1) as i32
    }
}

/// A sized statement block: `{ NumStatements; StmtOffset_1..N-1;
/// Stmt_0; ...; Stmt_N-1 }`. The leading count word is not a node.
#[derive(Clone, Copy)]
pub struct SizedBlockRef<'a> {
    data: &'a [u32],
    pub offset: usize,
}

impl<'a> SizedBlockRef<'a> {
    pub fn new(data: &'a [u32], offset: usize) -> Self {
        Self { data, offset }
    }

    pub fn num_statements(self) -> usize {
        self.data[self.offset] as usize
    }

    pub fn statement(self, idx: usize) -> NodeRef<'a> {
        debug_assert!(idx < self.num_statements());
        let base = NodeRef::new(self.data, self.offset);
        if idx == 0 {
            base.at(self.num_statements())
        } else {
            base.indirect_at(idx)
        }
    }
}

/// An unsized statement block whose count lives in the owning node's
/// `extra` field: `{ StmtOffset_1..N-1; Stmt_0; ...; Stmt_N-1 }`.
#[derive(Clone, Copy)]
pub struct BlockRef<'a> {
    data: &'a [u32],
    pub offset: usize,
    count: usize,
}

impl<'a> BlockRef<'a> {
    pub fn new(data: &'a [u32], offset: usize, count: usize) -> Self {
        Self {
            data,
            offset,
            count,
        }
    }

    pub fn num_statements(self) -> usize {
        self.count
    }

    pub fn statement(self, idx: usize) -> NodeRef<'a> {
        debug_assert!(idx < self.count);
        let base = NodeRef::new(self.data, self.offset);
        if idx == 0 {
            base.at(self.count - 1)
        } else {
            base.indirect_at(idx - 1)
        }
    }
}
