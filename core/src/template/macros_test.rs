#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::model::{Family, Instruction, Part, Properties, StackEffect, StackItem, Uop};
    use crate::stack::Stack;
    use crate::template::{emit_tokens, lex};
    use crate::writer::CodeWriter;

    fn uop(body: &str, inputs: Vec<StackItem>) -> Uop {
        Uop {
            name: "_OP".to_string(),
            stack: StackEffect {
                inputs,
                outputs: Vec::new(),
            },
            caches: Vec::new(),
            body: lex(body, Arc::from("defs.c"), 1).expect("lex"),
            properties: Properties::default(),
        }
    }

    fn expand(uop: &Uop, inst: &Instruction, stack: &mut Stack) -> String {
        let mut out = CodeWriter::new(0, false);
        emit_tokens(&mut out, uop, stack, inst).expect("expand");
        out.finish()
    }

    fn expand_fresh(body: &str) -> String {
        let uop = uop(body, Vec::new());
        let inst = Instruction::new("OP", vec![Part::Uop(uop.clone())]);
        expand(&uop, &inst, &mut Stack::new())
    }

    #[test]
    fn plain_tokens_pass_through() {
        assert_eq!(expand_fresh("{\n    res = a + b;\n}"), "res = a + b;");
        assert_eq!(expand_fresh("{}"), "");
    }

    #[test]
    fn deopt_targets_family_or_self() {
        let body = "{\n    DEOPT_IF(!PyLong_CheckExact(left));\n}";
        let op = uop(body, Vec::new());
        let mut inst = Instruction::new("BINARY_OP_ADD_INT", vec![Part::Uop(op.clone())]);
        assert_eq!(
            expand(&op, &inst, &mut Stack::new()),
            "DEOPT_IF(!PyLong_CheckExact(left), BINARY_OP_ADD_INT);\n"
        );

        inst.family = Some(Family {
            name: "BINARY_OP".to_string(),
            size: 1,
            members: vec!["BINARY_OP_ADD_INT".to_string()],
        });
        assert_eq!(
            expand(&op, &inst, &mut Stack::new()),
            "DEOPT_IF(!PyLong_CheckExact(left), BINARY_OP);\n"
        );
    }

    #[test]
    fn exit_if_expands_like_deopt() {
        assert_eq!(expand_fresh("{\n    EXIT_IF(x);\n}"), "DEOPT_IF(x, OP);\n");
    }

    #[test]
    fn error_if_without_pops_jumps_to_label() {
        assert_eq!(
            expand_fresh("{\n    ERROR_IF(res == NULL, error);\n}"),
            "if (res == NULL) goto error;\n"
        );
    }

    #[test]
    fn error_if_counts_popped_items() {
        let inputs = vec![StackItem::new("left"), StackItem::new("right")];
        let op = uop("{\n    ERROR_IF(res == NULL, error);\n}", inputs.clone());
        let inst = Instruction::new("OP", vec![Part::Uop(op.clone())]);
        let mut stack = Stack::new();
        for var in inputs.iter().rev() {
            stack.pop(var).expect("pop");
        }
        assert_eq!(expand(&op, &inst, &mut stack), "if (res == NULL) goto pop_2_error;\n");
    }

    #[test]
    fn error_if_counts_net_pops_after_pushes() {
        let inputs = vec![StackItem::new("left"), StackItem::new("right")];
        let op = uop("{\n    ERROR_IF(res == NULL, error);\n}", inputs.clone());
        let inst = Instruction::new("OP", vec![Part::Uop(op.clone())]);
        let mut stack = Stack::new();
        for var in inputs.iter().rev() {
            stack.pop(var).expect("pop");
        }
        stack.push(&StackItem::new("res")).expect("push");
        assert_eq!(expand(&op, &inst, &mut stack), "if (res == NULL) goto pop_1_error;\n");
    }

    #[test]
    fn error_if_with_symbolic_pops_flushes_locally() {
        let args = StackItem::new("args").with_size("oparg");
        let op = uop("{\n    ERROR_IF(true, error);\n}", vec![args.clone()]);
        let inst = Instruction::new("OP", vec![Part::Uop(op.clone())]);
        let mut stack = Stack::new();
        stack.pop(&args).expect("pop");
        assert_eq!(
            expand(&op, &inst, &mut stack),
            "if (true) {\n    stack_pointer += -oparg;\n    assert(WITHIN_STACK_BOUNDS());\n    goto error;\n}\n"
        );
        // the early exit must not disturb the stack seen by later code
        assert_eq!(stack.peek_offset().to_c(), "-oparg");
    }

    #[test]
    fn decref_inputs_skips_peeks_and_unused() {
        let inputs = vec![
            StackItem::new("a"),
            StackItem::new("unused"),
            StackItem::new("b").with_condition("oparg & 1"),
            StackItem::new("never").with_condition("0"),
            StackItem::new("args").with_size("oparg"),
            StackItem::new("p").peeked(),
        ];
        let op = uop("{\n    DECREF_INPUTS();\n}", inputs);
        let inst = Instruction::new("OP", vec![Part::Uop(op.clone())]);
        assert_eq!(
            expand(&op, &inst, &mut Stack::new()),
            "PyStackRef_CLOSE(a);\nPyStackRef_XCLOSE(b);\nfor (int _i = oparg; --_i >= 0;) {\n    PyStackRef_CLOSE(args[_i]);\n}\n"
        );
    }

    #[test]
    fn sync_sp_flushes_the_stack() {
        let res = StackItem::new("res");
        let op = uop("{\n    SYNC_SP();\n}", Vec::new());
        let inst = Instruction::new("OP", vec![Part::Uop(op.clone())]);
        let mut stack = Stack::new();
        stack.push(&res).expect("push");
        assert_eq!(
            expand(&op, &inst, &mut stack),
            "stack_pointer[0] = res;\nstack_pointer += 1;\nassert(WITHIN_STACK_BOUNDS());\n"
        );
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn error_no_pop_and_eval_breaker() {
        assert_eq!(expand_fresh("{\n    ERROR_NO_POP();\n}"), "goto error;");
        assert_eq!(expand_fresh("{\n    CHECK_EVAL_BREAKER();\n}"), "CHECK_EVAL_BREAKER();");

        let mut op = uop("{\n    CHECK_EVAL_BREAKER();\n}", Vec::new());
        op.properties.ends_with_eval_breaker = true;
        let inst = Instruction::new("OP", vec![Part::Uop(op.clone())]);
        assert_eq!(expand(&op, &inst, &mut Stack::new()), "");
    }

    #[test]
    fn malformed_invocations_are_reported() {
        let cases = [
            ("{\n    DEOPT_IF x;\n}", "expected '(' in DEOPT_IF"),
            ("{\n    DEOPT_IF(x\n}", "unterminated DEOPT_IF"),
            ("{\n    ERROR_IF(x, error)\n}", "unexpected end of body in ERROR_IF"),
            ("{\n    SYNC_SP(1);\n}", "expected ')' in SYNC_SP"),
        ];
        for (body, expected) in cases {
            let op = uop(body, Vec::new());
            let inst = Instruction::new("OP", vec![Part::Uop(op.clone())]);
            let mut out = CodeWriter::new(0, false);
            let err = emit_tokens(&mut out, &op, &mut Stack::new(), &inst).unwrap_err();
            assert!(err.message.contains(expected), "{body}: {}", err.message);
            assert_eq!(err.line, 2);
            assert_eq!(&*err.file, "defs.c");
        }
    }
}
