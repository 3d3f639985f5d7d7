use proptest::prelude::*;

use arexx::bbs::LocalBbs;
use arexx::script::builtins::{call_builtin, BUILTIN_NAMES};
use arexx::script::source::preprocess;
use arexx::script::{Interpreter, Value};

/// One statement (possibly a whole block) that always terminates.
fn statement() -> impl Strategy<Value = String> {
    prop_oneof![
        (-50i64..50).prop_map(|n| format!("X = {n}")),
        (-50i64..50).prop_map(|n| format!("Y = X + {n}")),
        Just("SAY X".to_owned()),
        Just("SAY 'y=' || Y".to_owned()),
        (-50i64..50).prop_map(|n| format!("IF X > {n} THEN SAY 'big'")),
        (0i64..5).prop_map(|n| format!("DO I = 1 TO {n}\n  SAY I\nEND")),
        (0i64..4).prop_map(|n| format!("DO {n}\n  X = X + 1\nEND")),
        (-5i64..5).prop_map(|n| format!(
            "SELECT\n  WHEN X = {n} THEN SAY 'hit'\n  OTHERWISE SAY 'miss'\nEND"
        )),
        (-50i64..50).prop_map(|n| format!("CALL SHOW {n}")),
        Just("Z = SHOW(X)".to_owned()),
        Just("PARSE VALUE 'alpha beta gamma' WITH A B\nSAY B".to_owned()),
        "[a-z ]{0,12}".prop_map(|s| format!("SAY UPPER('{s}') || LENGTH('{s}')")),
    ]
}

fn program() -> impl Strategy<Value = String> {
    prop::collection::vec(statement(), 0..12).prop_map(|body| {
        let mut src = String::from("PROCEDURE SHOW(V)\n  SAY '<' || V || '>'\n  RETURN V\nEND\n");
        src.push_str(&body.join("\n"));
        src
    })
}

fn builtin_arg() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Str),
        (-1000i64..1000).prop_map(Value::from),
        (-1000.0f64..1000.0).prop_map(Value::Num),
        any::<bool>().prop_map(Value::Bool),
    ]
}

proptest! {
    /// Preprocessing accepts anything and keeps a consistent line/label table.
    #[test]
    fn preprocess_is_total(s in "\\PC*(\n\\PC*){0,8}") {
        let program = preprocess(&s);
        for pair in program.lines.windows(2) {
            prop_assert!(pair[0].number < pair[1].number);
        }
        for line in &program.lines {
            prop_assert!(!line.text.is_empty());
        }
        for &idx in program.labels.values() {
            prop_assert!(idx < program.lines.len());
        }
    }

    /// Arbitrary single-line input either runs or fails with an error; it
    /// never panics and never reports success alongside an error.
    #[test]
    fn execute_never_panics(s in "\\PC{0,120}") {
        let r = Interpreter::new(LocalBbs::default()).execute(&s, &[]);
        prop_assert_eq!(r.success, r.error.is_none());
    }

    /// Every SAY line reaches the host, in order, and nothing else does.
    #[test]
    fn say_output_matches_host(src in program()) {
        let mut interp = Interpreter::new(LocalBbs::default());
        let r = interp.execute(&src, &[]);
        prop_assert_eq!(interp.host().sent(), r.output.as_slice());
    }

    /// Fresh interpreters given the same script and board produce identical
    /// results.
    #[test]
    fn runs_are_deterministic(src in program()) {
        let a = Interpreter::new(LocalBbs::default()).execute(&src, &[]);
        let b = Interpreter::new(LocalBbs::default()).execute(&src, &[]);
        prop_assert_eq!(a, b);
    }

    /// A procedure cannot disturb a caller variable, whatever its name.
    #[test]
    fn procedures_do_not_leak(name in "V_[A-Z0-9]{0,6}", value in "[a-z]{0,10}") {
        let src = format!(
            "{name} = '{value}'\n\
             PROCEDURE CLOBBER({name})\n  {name} = 'inner'\n  RETURN {name}\nEND\n\
             R = CLOBBER('arg')\n\
             SAY {name}\n\
             SAY R"
        );
        let r = Interpreter::new(LocalBbs::default()).execute(&src, &[]);
        prop_assert!(r.success, "{:?}", r.error);
        prop_assert_eq!(r.output, vec![value, "inner".to_owned()]);
    }

    /// Built-ins reject bad arguments with an error instead of panicking.
    #[test]
    fn builtins_do_not_panic(
        idx in 0..BUILTIN_NAMES.len(),
        args in prop::collection::vec(builtin_arg(), 0..4),
    ) {
        let name = BUILTIN_NAMES[idx];
        prop_assert!(call_builtin(name, &args).is_some(), "{} not dispatched", name);
    }

    /// SUBSTR never yields more characters than asked for.
    #[test]
    fn substr_length(s in "\\PC{0,30}", start in 1i64..40, len in 0i64..40) {
        let args = [Value::Str(s), Value::from(start), Value::from(len)];
        match call_builtin("SUBSTR", &args) {
            Some(Ok(out)) => prop_assert_eq!(out.as_str().chars().count(), len as usize),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
