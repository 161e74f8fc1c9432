use std::collections::HashMap;

use crate::node::{pack_node_word, NodeType, MAX_EXTRA};

/// The serialized output of the front end: the packed node text plus
/// the constants the nodes refer to by index (identifier strings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub data: Vec<u32>,
    pub constants: Vec<String>,
}

/// Interning table for constants referenced by the packed text.
#[derive(Default)]
pub struct ConstantPool {
    constants: Vec<String>,
    index: HashMap<String, u32>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant_id(&mut self, name: &str) -> u32 {
        if let Some(&cid) = self.index.get(name) {
            return cid;
        }
        let cid = self.constants.len() as u32;
        self.constants.push(name.to_string());
        self.index.insert(name.to_string(), cid);
        cid
    }

    pub fn into_constants(self) -> Vec<String> {
        self.constants
    }
}

fn header(node_type: NodeType, extra: usize) -> u32 {
    debug_assert!(extra as u32 <= MAX_EXTRA);
    pack_node_word(node_type, extra as u32)
}

/// Append an offset-table block: relative offsets for children 1..N-1
/// starting at table word `first_slot`, then the children themselves.
/// Child 0 lands immediately after the table.
fn push_offset_block(out: &mut Vec<u32>, first_slot: usize, children: &[Vec<u32>]) {
    let n = children.len();
    if n == 0 {
        return;
    }
    let mut pos = first_slot + (n - 1);
    for i in 1..n {
        pos += children[i - 1].len();
        let slot = first_slot + (i - 1);
        out.push((pos - slot) as u32);
    }
    for child in children {
        out.extend_from_slice(child);
    }
}

// ── Statements ─────────────────────────────────────────────────────

pub fn file(statements: &[Vec<u32>]) -> Vec<u32> {
    let n = statements.len();
    let mut out = vec![header(NodeType::File, n)];
    push_offset_block(&mut out, 1, statements);
    out
}

/// A sized block: leading raw statement count, then the offset table
/// and statements. Not itself a node.
pub fn sized_block(statements: &[Vec<u32>]) -> Vec<u32> {
    let n = statements.len();
    let mut out = vec![n as u32];
    push_offset_block(&mut out, 1, statements);
    out
}

/// An unsized block; the owning node carries the count in `extra`.
pub fn block(statements: &[Vec<u32>]) -> Vec<u32> {
    let mut out = Vec::new();
    push_offset_block(&mut out, 0, statements);
    out
}

pub fn empty_stmt() -> Vec<u32> {
    vec![header(NodeType::EmptyStmt, 0)]
}

pub fn expr_stmt(expr: &[u32]) -> Vec<u32> {
    let mut out = vec![header(NodeType::ExprStmt, 0)];
    out.extend_from_slice(expr);
    out
}

pub fn return_stmt(expr: Option<&[u32]>) -> Vec<u32> {
    match expr {
        Some(expr) => {
            let mut out = vec![header(NodeType::ReturnStmt, 1)];
            out.extend_from_slice(expr);
            out
        }
        None => vec![header(NodeType::ReturnStmt, 0)],
    }
}

pub fn if_stmt(
    cond: &[u32],
    if_block: &[u32],
    elsifs: &[(Vec<u32>, Vec<u32>)],
    else_block: Option<&[u32]>,
) -> Vec<u32> {
    let e = elsifs.len();
    let has_else = else_block.is_some();
    let extra = (e << 1) | has_else as usize;
    let table_len = 2 + e * 2 + has_else as usize;

    let mut out = Vec::with_capacity(table_len);
    out.push(header(NodeType::IfStmt, extra));

    // Offsets are filled in as positions become known.
    let mut pos = table_len + cond.len();
    out.push((pos - 1) as u32); // if-block offset at word 1
    pos += if_block.len();
    for (i, (elsif_cond, elsif_block)) in elsifs.iter().enumerate() {
        let cond_slot = 2 + i * 2;
        out.push((pos - cond_slot) as u32);
        pos += elsif_cond.len();
        let block_slot = 3 + i * 2;
        out.push((pos - block_slot) as u32);
        pos += elsif_block.len();
    }
    if has_else {
        let else_slot = 2 + e * 2;
        out.push((pos - else_slot) as u32);
    }
    debug_assert_eq!(out.len(), table_len);

    out.extend_from_slice(cond);
    out.extend_from_slice(if_block);
    for (elsif_cond, elsif_block) in elsifs {
        out.extend_from_slice(elsif_cond);
        out.extend_from_slice(elsif_block);
    }
    if let Some(else_block) = else_block {
        out.extend_from_slice(else_block);
    }
    out
}

pub fn def_stmt(name_cid: u32, param_cids: &[u32], body: &[u32]) -> Vec<u32> {
    let mut out = vec![header(NodeType::DefStmt, param_cids.len()), name_cid];
    out.extend_from_slice(param_cids);
    out.extend_from_slice(body);
    out
}

/// `var` and `const` bindings; `None` initializers are encoded as a
/// zero offset (only legal for `var`).
pub fn binding_stmt(
    node_type: NodeType,
    bindings: &[(u32, Option<Vec<u32>>)],
) -> Vec<u32> {
    debug_assert!(matches!(node_type, NodeType::VarStmt | NodeType::ConstStmt));
    let n = bindings.len();
    let mut out = vec![header(node_type, n)];
    let table_len = 1 + n * 2;
    let mut pos = table_len;
    for (i, (name_cid, init)) in bindings.iter().enumerate() {
        out.push(*name_cid);
        let slot = 2 + i * 2;
        match init {
            Some(expr) => {
                out.push((pos - slot) as u32);
                pos += expr.len();
            }
            None => out.push(0),
        }
    }
    for (_, init) in bindings {
        if let Some(expr) = init {
            out.extend_from_slice(expr);
        }
    }
    out
}

pub fn loop_stmt(statements: &[Vec<u32>]) -> Vec<u32> {
    let mut out = vec![header(NodeType::LoopStmt, statements.len())];
    out.extend_from_slice(&block(statements));
    out
}

// ── Expressions ────────────────────────────────────────────────────

pub fn call_expr(callee: &[u32], args: &[Vec<u32>]) -> Vec<u32> {
    let n = args.len();
    let mut out = vec![header(NodeType::CallExpr, n)];
    let mut pos = 1 + n + callee.len();
    for (i, arg) in args.iter().enumerate() {
        let slot = 1 + i;
        out.push((pos - slot) as u32);
        pos += arg.len();
    }
    out.extend_from_slice(callee);
    for arg in args {
        out.extend_from_slice(arg);
    }
    out
}

pub fn access_expr(node_type: NodeType, name_cid: u32, target: &[u32]) -> Vec<u32> {
    debug_assert!(matches!(node_type, NodeType::DotExpr | NodeType::ArrowExpr));
    let mut out = vec![header(node_type, 0), name_cid];
    out.extend_from_slice(target);
    out
}

pub fn unary_expr(node_type: NodeType, subexpr: &[u32]) -> Vec<u32> {
    debug_assert!(matches!(
        node_type,
        NodeType::PosExpr | NodeType::NegExpr | NodeType::ParenExpr
    ));
    let mut out = vec![header(node_type, 0)];
    out.extend_from_slice(subexpr);
    out
}

pub fn binary_expr(node_type: NodeType, lhs: &[u32], rhs: &[u32]) -> Vec<u32> {
    debug_assert!(matches!(
        node_type,
        NodeType::AddExpr | NodeType::SubExpr | NodeType::MulExpr | NodeType::DivExpr
    ));
    let mut out = vec![header(node_type, 0)];
    out.push((1 + lhs.len()) as u32); // rhs offset at word 1
    out.extend_from_slice(lhs);
    out.extend_from_slice(rhs);
    out
}

pub fn name_expr(name_cid: u32) -> Vec<u32> {
    vec![header(NodeType::NameExpr, 0), name_cid]
}

pub fn integer_expr(value: i32) -> Vec<u32> {
    vec![header(NodeType::IntegerExpr, 0), value as u32]
}
