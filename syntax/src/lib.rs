mod node;
mod parser;
mod token;
pub mod writer;

pub use node::{
    pack_node_word, BlockRef, NodeRef, NodeType, SizedBlockRef, MAX_EXTRA,
    TYPE_BITS, TYPE_MASK,
};
pub use parser::parse_source;
pub use token::{Lexer, ParseError, Token};
pub use writer::Program;

#[cfg(test)]
mod tests {
    use super::*;

    fn root(program: &Program) -> NodeRef<'_> {
        NodeRef::new(&program.data, 0)
    }

    fn cid_of(program: &Program, name: &str) -> u32 {
        program
            .constants
            .iter()
            .position(|c| c == name)
            .map(|i| i as u32)
            .unwrap_or_else(|| panic!("constant {name} missing"))
    }

    #[test]
    fn lexes_operators_and_keywords() {
        let mut lexer = Lexer::new("var x = a -> b - 3; // trailing\n/* block */ def");
        let mut tokens = Vec::new();
        loop {
            let (token, ..) = lexer.next_token().expect("lex");
            if token == Token::Eof {
                break;
            }
            tokens.push(token);
        }
        assert_eq!(
            tokens,
            vec![
                Token::Var,
                Token::Name("x".into()),
                Token::Assign,
                Token::Name("a".into()),
                Token::Arrow,
                Token::Name("b".into()),
                Token::Minus,
                Token::Int(3),
                Token::Semi,
                Token::Def,
            ]
        );
    }

    #[test]
    fn rejects_out_of_range_integers() {
        assert!(parse_source("2147483648").is_err());
        assert!(parse_source("2147483647").is_ok());
    }

    #[test]
    fn file_statements_resolve_in_order() {
        let program = parse_source("var x = 3; x").expect("parse");
        let file = root(&program);
        assert_eq!(file.node_type(), Some(NodeType::File));
        assert_eq!(file.file_num_statements(), 2);

        let var = file.file_statement(0);
        assert_eq!(var.node_type(), Some(NodeType::VarStmt));
        assert_eq!(var.var_num_bindings(), 1);
        assert_eq!(var.var_name_cid(0), cid_of(&program, "x"));
        assert!(var.var_has_init(0));
        let init = var.var_init(0);
        assert_eq!(init.node_type(), Some(NodeType::IntegerExpr));
        assert_eq!(init.integer_value(), 3);

        let stmt = file.file_statement(1);
        assert_eq!(stmt.node_type(), Some(NodeType::ExprStmt));
        let name = stmt.subexpression();
        assert_eq!(name.node_type(), Some(NodeType::NameExpr));
        assert_eq!(name.name_cid(), cid_of(&program, "x"));
    }

    #[test]
    fn var_without_initializer_has_zero_offset() {
        let program = parse_source("var a, b = 1, c;").expect("parse");
        let var = root(&program).file_statement(0);
        assert_eq!(var.var_num_bindings(), 3);
        assert!(!var.var_has_init(0));
        assert!(var.var_has_init(1));
        assert!(!var.var_has_init(2));
        assert_eq!(var.var_init(1).integer_value(), 1);
    }

    #[test]
    fn const_requires_initializer() {
        assert!(parse_source("const k;").is_err());
        let program = parse_source("const k = 9").expect("parse");
        let konst = root(&program).file_statement(0);
        assert_eq!(konst.node_type(), Some(NodeType::ConstStmt));
        assert!(konst.var_has_init(0));
    }

    #[test]
    fn def_body_and_params() {
        let program =
            parse_source("def f(x, y) { return x + 1 } f(41)").expect("parse");
        let file = root(&program);
        let def = file.file_statement(0);
        assert_eq!(def.node_type(), Some(NodeType::DefStmt));
        assert_eq!(def.def_num_params(), 2);
        assert_eq!(def.def_name_cid(), cid_of(&program, "f"));
        assert_eq!(def.def_param_cid(0), cid_of(&program, "x"));
        assert_eq!(def.def_param_cid(1), cid_of(&program, "y"));

        let body = def.def_body_block();
        assert_eq!(body.num_statements(), 1);
        let ret = body.statement(0);
        assert_eq!(ret.node_type(), Some(NodeType::ReturnStmt));
        assert!(ret.return_has_expression());
        let add = ret.return_expression();
        assert_eq!(add.node_type(), Some(NodeType::AddExpr));
        assert_eq!(add.binary_lhs().node_type(), Some(NodeType::NameExpr));
        assert_eq!(add.binary_rhs().integer_value(), 1);

        let call_stmt = file.file_statement(1);
        let call = call_stmt.subexpression();
        assert_eq!(call.node_type(), Some(NodeType::CallExpr));
        assert_eq!(call.call_num_args(), 1);
        assert_eq!(call.call_callee().node_type(), Some(NodeType::NameExpr));
        assert_eq!(call.call_arg(0).integer_value(), 41);
    }

    #[test]
    fn precedence_groups_parenthesized_addition_under_multiply() {
        let program = parse_source("(1 + 2) * 10").expect("parse");
        let mul = root(&program).file_statement(0).subexpression();
        assert_eq!(mul.node_type(), Some(NodeType::MulExpr));
        let paren = mul.binary_lhs();
        assert_eq!(paren.node_type(), Some(NodeType::ParenExpr));
        let add = paren.subexpression();
        assert_eq!(add.node_type(), Some(NodeType::AddExpr));
        assert_eq!(add.binary_lhs().integer_value(), 1);
        assert_eq!(add.binary_rhs().integer_value(), 2);
        assert_eq!(mul.binary_rhs().integer_value(), 10);
    }

    #[test]
    fn multiplication_binds_tighter_without_parens() {
        let program = parse_source("1 + 2 * 10").expect("parse");
        let add = root(&program).file_statement(0).subexpression();
        assert_eq!(add.node_type(), Some(NodeType::AddExpr));
        assert_eq!(add.binary_lhs().integer_value(), 1);
        assert_eq!(add.binary_rhs().node_type(), Some(NodeType::MulExpr));
    }

    #[test]
    fn if_elsif_else_blocks_resolve() {
        let program = parse_source(
            "if (c) { 1; 2 } elsif (d) { 3 } else { 4; 5; 6 }",
        )
        .expect("parse");
        let ifs = root(&program).file_statement(0);
        assert_eq!(ifs.node_type(), Some(NodeType::IfStmt));
        assert_eq!(ifs.if_num_elsifs(), 1);
        assert!(ifs.if_has_else());

        assert_eq!(ifs.if_cond().node_type(), Some(NodeType::NameExpr));
        let if_block = ifs.if_block();
        assert_eq!(if_block.num_statements(), 2);
        assert_eq!(
            if_block.statement(1).subexpression().integer_value(),
            2
        );

        assert_eq!(ifs.if_elsif_cond(0).name_cid(), cid_of(&program, "d"));
        assert_eq!(ifs.if_elsif_block(0).num_statements(), 1);
        assert_eq!(
            ifs.if_elsif_block(0).statement(0).subexpression().integer_value(),
            3
        );

        let else_block = ifs.if_else_block();
        assert_eq!(else_block.num_statements(), 3);
        assert_eq!(else_block.statement(0).subexpression().integer_value(), 4);
        assert_eq!(else_block.statement(2).subexpression().integer_value(), 6);
    }

    #[test]
    fn loop_body_statements_resolve() {
        let program = parse_source("loop { 1; 2; 3 }").expect("parse");
        let l = root(&program).file_statement(0);
        assert_eq!(l.node_type(), Some(NodeType::LoopStmt));
        let body = l.loop_body();
        assert_eq!(body.num_statements(), 3);
        for i in 0..3 {
            assert_eq!(
                body.statement(i).subexpression().integer_value(),
                i as i32 + 1
            );
        }
    }

    #[test]
    fn dots_arrows_and_chained_calls() {
        let program = parse_source("a.b->c(1)(2)").expect("parse");
        let outer = root(&program).file_statement(0).subexpression();
        assert_eq!(outer.node_type(), Some(NodeType::CallExpr));
        assert_eq!(outer.call_arg(0).integer_value(), 2);
        let inner = outer.call_callee();
        assert_eq!(inner.node_type(), Some(NodeType::CallExpr));
        assert_eq!(inner.call_arg(0).integer_value(), 1);
        let arrow = inner.call_callee();
        assert_eq!(arrow.node_type(), Some(NodeType::ArrowExpr));
        assert_eq!(arrow.access_name_cid(), cid_of(&program, "c"));
        let dot = arrow.access_target();
        assert_eq!(dot.node_type(), Some(NodeType::DotExpr));
        assert_eq!(dot.access_name_cid(), cid_of(&program, "b"));
        assert_eq!(dot.access_target().node_type(), Some(NodeType::NameExpr));
    }

    #[test]
    fn empty_and_bare_return_statements() {
        let program = parse_source(";; return; return 7").expect("parse");
        let file = root(&program);
        assert_eq!(file.file_num_statements(), 4);
        assert_eq!(file.file_statement(0).node_type(), Some(NodeType::EmptyStmt));
        let bare = file.file_statement(2);
        assert_eq!(bare.node_type(), Some(NodeType::ReturnStmt));
        assert!(!bare.return_has_expression());
        let ret = file.file_statement(3);
        assert!(ret.return_has_expression());
        assert_eq!(ret.return_expression().integer_value(), 7);
    }

    #[test]
    fn reports_positions_in_errors() {
        let err = parse_source("var x = ;").expect_err("should fail");
        assert_eq!(err.line, 1);
        assert!(err.message.contains("expected expression"));
    }
}
