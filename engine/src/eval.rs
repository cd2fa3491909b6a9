// eval.rs — Expression evaluator
//
// Walks a resolved node tree against an environment. Evaluation is a single
// left-to-right pass with no memoization. `IF`, `IF_ELSE`, `AND` and `OR`
// are lazy: an operand that is not needed is never evaluated, so its
// register writes never happen. Because `SR_WRITE` returns `true`,
// `a AND b` sequences two writes and `IF(c1, w1) OR IF(c2, w2)` picks the
// first branch whose condition holds.
//
// Preconditions: `node` was resolved against `schema`.
// Postconditions: every write is handed to `effects` in evaluation order.
// Failure modes: operand kind errors, LOG2 of a non power of two, overflow,
//                unset arguments, unknown dynamic register names, and effect
//                failures abort evaluation immediately.
// Side effects: only through `Effects`.

use crate::error::{ActionFailure, EvalError};
use crate::id::ArgId;
use crate::primitives::Primitive;
use crate::resolve::{Node, PortAttr, WriteTarget};
use crate::schema::{BlockSchema, Register};
use crate::sink::RegisterWrite;
use crate::value::{Value, ValueKind};

/// Variables visible to an expression.
pub trait Environment {
    fn arg(&self, id: ArgId) -> Option<&Value>;

    fn self_attr(&self, _attr: PortAttr) -> Option<&Value> {
        None
    }
}

/// Receiver of register writes.
pub trait Effects {
    fn write(&mut self, write: RegisterWrite) -> Result<(), ActionFailure>;
}

/// Effects handler for checks and port attributes: any write is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pure;

impl Effects for Pure {
    fn write(&mut self, _write: RegisterWrite) -> Result<(), ActionFailure> {
        Err(EvalError::EffectInPureContext.into())
    }
}

/// Evaluate an action-capable expression.
pub fn evaluate(
    schema: &BlockSchema,
    node: &Node,
    env: &dyn Environment,
    effects: &mut dyn Effects,
) -> Result<Value, ActionFailure> {
    Machine {
        schema,
        env,
        effects,
    }
    .eval(node)
}

/// Evaluate a side-effect-free expression (check or port attribute).
pub fn evaluate_pure(
    schema: &BlockSchema,
    node: &Node,
    env: &dyn Environment,
) -> Result<Value, EvalError> {
    match evaluate(schema, node, env, &mut Pure) {
        Ok(value) => Ok(value),
        Err(ActionFailure::Evaluation(err)) => Err(err),
        Err(ActionFailure::Hardware(_)) => Err(EvalError::EffectInPureContext),
    }
}

struct Machine<'a> {
    schema: &'a BlockSchema,
    env: &'a dyn Environment,
    effects: &'a mut dyn Effects,
}

impl Machine<'_> {
    fn eval(&mut self, node: &Node) -> Result<Value, ActionFailure> {
        match node {
            Node::Const(value) => Ok(value.clone()),
            Node::Arg(id) => self
                .env
                .arg(*id)
                .cloned()
                .ok_or_else(|| EvalError::Unset(self.schema.arg(*id).name.clone()).into()),
            Node::SelfAttr(attr) => self
                .env
                .self_attr(*attr)
                .cloned()
                .ok_or_else(|| EvalError::SelfAttrUnavailable(attr.name()).into()),
            Node::Call { prim, args } => self.call(*prim, args),
            Node::Write { target, value } => self.sr_write(target, value),
        }
    }

    fn int(&mut self, prim: Primitive, node: &Node) -> Result<i64, ActionFailure> {
        match self.eval(node)? {
            Value::Int(v) => Ok(v),
            other => Err(EvalError::OperandKind {
                prim,
                expected: ValueKind::Int,
                found: other.kind(),
            }
            .into()),
        }
    }

    fn truthy(&mut self, node: &Node) -> Result<bool, ActionFailure> {
        Ok(self.eval(node)?.is_truthy())
    }

    fn call(&mut self, prim: Primitive, args: &[Node]) -> Result<Value, ActionFailure> {
        let value = match prim {
            Primitive::Ge | Primitive::Le | Primitive::Lt | Primitive::Gt => {
                let a = self.int(prim, &args[0])?;
                let b = self.int(prim, &args[1])?;
                Value::Bool(match prim {
                    Primitive::Ge => a >= b,
                    Primitive::Le => a <= b,
                    Primitive::Lt => a < b,
                    _ => a > b,
                })
            }
            Primitive::Equal => {
                let a = self.eval(&args[0])?;
                let b = self.eval(&args[1])?;
                // Values of different kinds compare unequal.
                Value::Bool(a == b)
            }
            Primitive::IsPwrOf2 => Value::Bool(is_power_of_two(self.int(prim, &args[0])?)),
            Primitive::Not => Value::Bool(!self.truthy(&args[0])?),
            Primitive::Add => {
                let a = self.int(prim, &args[0])?;
                let b = self.int(prim, &args[1])?;
                Value::Int(a.checked_add(b).ok_or(EvalError::Overflow(prim))?)
            }
            Primitive::Mult => {
                let a = self.int(prim, &args[0])?;
                let b = self.int(prim, &args[1])?;
                Value::Int(a.checked_mul(b).ok_or(EvalError::Overflow(prim))?)
            }
            Primitive::Log2 => {
                let x = self.int(prim, &args[0])?;
                if !is_power_of_two(x) {
                    return Err(EvalError::NotPowerOfTwo(x).into());
                }
                Value::Int(i64::from(x.trailing_zeros()))
            }
            Primitive::ShiftLeft => {
                let a = self.int(prim, &args[0])?;
                let shift = shift_amount(self.int(prim, &args[1])?)?;
                let shifted = a << shift;
                if shifted >> shift != a {
                    return Err(EvalError::Overflow(prim).into());
                }
                Value::Int(shifted)
            }
            Primitive::ShiftRight => {
                let a = self.int(prim, &args[0])?;
                let shift = shift_amount(self.int(prim, &args[1])?)?;
                Value::Int(a >> shift)
            }
            Primitive::If => {
                if self.truthy(&args[0])? {
                    self.eval(&args[1])?
                } else {
                    Value::Bool(false)
                }
            }
            Primitive::IfElse => {
                if self.truthy(&args[0])? {
                    self.eval(&args[1])?
                } else {
                    self.eval(&args[2])?
                }
            }
            Primitive::And => {
                let a = self.eval(&args[0])?;
                if !a.is_truthy() {
                    return Ok(a);
                }
                self.eval(&args[1])?
            }
            Primitive::Or => {
                let a = self.eval(&args[0])?;
                if a.is_truthy() {
                    return Ok(a);
                }
                self.eval(&args[1])?
            }
            Primitive::True => Value::Bool(true),
            Primitive::False => Value::Bool(false),
            // Resolution turns every SR_WRITE into `Node::Write`.
            Primitive::SrWrite => return Err(EvalError::EffectInPureContext.into()),
        };
        Ok(value)
    }

    fn sr_write(&mut self, target: &WriteTarget, value: &Node) -> Result<Value, ActionFailure> {
        let schema = self.schema;
        let register: &Register = match target {
            WriteTarget::Static(id) => schema.register(*id),
            WriteTarget::Dynamic(node) => match self.eval(node)? {
                Value::Str(name) => schema
                    .writable_register(&name)
                    .ok_or(EvalError::UndeclaredRegister(name))?,
                other => {
                    return Err(EvalError::OperandKind {
                        prim: Primitive::SrWrite,
                        expected: ValueKind::Str,
                        found: other.kind(),
                    }
                    .into())
                }
            },
        };
        let raw = self.int(Primitive::SrWrite, value)?;
        let value = register_value(raw).ok_or_else(|| EvalError::RegisterRange {
            register: register.name.clone(),
            value: raw,
        })?;
        self.effects.write(RegisterWrite {
            register: register.name.clone(),
            address: register.address,
            value,
        })?;
        Ok(Value::Bool(true))
    }
}

/// True iff `x` is positive with exactly one bit set.
pub fn is_power_of_two(x: i64) -> bool {
    x > 0 && x & (x - 1) == 0
}

fn shift_amount(raw: i64) -> Result<u32, EvalError> {
    u32::try_from(raw)
        .ok()
        .filter(|s| *s < 64)
        .ok_or(EvalError::ShiftRange(raw))
}

/// Registers are 32 bits wide. Negative values down to `i32::MIN` are
/// written as their two's-complement pattern.
fn register_value(raw: i64) -> Option<u32> {
    u32::try_from(raw)
        .ok()
        .or_else(|| i32::try_from(raw).ok().map(|v| v as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::diag::Diagnostic;
    use crate::resolve::{compile, ExprContext};
    use crate::store::ArgumentStore;

    const DESC: &str = r#"{
        "name": "Probe",
        "ids": [{ "id": "0x1" }],
        "registers": {
            "setreg": [
                { "name": "A", "address": 10 },
                { "name": "B", "address": 11 }
            ]
        },
        "args": [
            { "name": "n", "type": "int", "value": "16" },
            { "name": "mode", "type": "string", "value": "A" }
        ]
    }"#;

    fn schema() -> BlockSchema {
        BlockSchema::from_descriptor(&Descriptor::from_json(DESC).unwrap()).unwrap()
    }

    fn store(schema: &BlockSchema, n: i64, mode: &str) -> ArgumentStore {
        let mut store = ArgumentStore::new(schema.args().len());
        store.commit(ArgId(0), Value::Int(n));
        store.commit(ArgId(1), Value::Str(mode.into()));
        store
    }

    #[derive(Default)]
    struct Collect(Vec<RegisterWrite>);

    impl Effects for Collect {
        fn write(&mut self, write: RegisterWrite) -> Result<(), ActionFailure> {
            self.0.push(write);
            Ok(())
        }
    }

    fn run(source: &str, n: i64) -> (Result<Value, ActionFailure>, Vec<String>) {
        let schema = schema();
        let mut diags: Vec<Diagnostic> = Vec::new();
        let compiled = compile(source, ExprContext::Action, schema.symbols(), "test", &mut diags)
            .unwrap_or_else(|| panic!("compile failed: {:#?}", diags));
        let env = store(&schema, n, "A");
        let mut effects = Collect::default();
        let result = evaluate(&schema, &compiled.root, &env, &mut effects);
        let writes = effects.0.iter().map(|w| w.to_string()).collect();
        (result, writes)
    }

    fn value(source: &str, n: i64) -> Value {
        run(source, n).0.expect("evaluation failed")
    }

    #[test]
    fn is_power_of_two_boundaries() {
        for x in [1, 2, 16, 256, 4096, 1 << 40] {
            assert!(is_power_of_two(x), "{x}");
        }
        for x in [0, -16, 15, 17, 4097, i64::MIN] {
            assert!(!is_power_of_two(x), "{x}");
        }
    }

    #[test]
    fn comparisons() {
        assert_eq!(value("GE($n, 16)", 16), Value::Bool(true));
        assert_eq!(value("LE($n, 15)", 16), Value::Bool(false));
        assert_eq!(value("LT($n, 17)", 16), Value::Bool(true));
        assert_eq!(value("GT($n, 16)", 16), Value::Bool(false));
    }

    #[test]
    fn equal_mixed_kinds_is_false() {
        assert_eq!(value("EQUAL($mode, 16)", 16), Value::Bool(false));
        assert_eq!(value("EQUAL($mode, \"A\")", 16), Value::Bool(true));
        assert_eq!(value("EQUAL($n, 16)", 16), Value::Bool(true));
    }

    #[test]
    fn arithmetic() {
        assert_eq!(value("ADD(873472, LOG2($n))", 256), Value::Int(873_480));
        assert_eq!(value("MULT($n, 3)", 4), Value::Int(12));
        assert_eq!(value("SHIFT_LEFT(1, $n)", 12), Value::Int(4096));
        assert_eq!(value("SHIFT_RIGHT($n, 2)", 16), Value::Int(4));
    }

    #[test]
    fn log2_rejects_non_power() {
        let (result, _) = run("LOG2($n)", 12);
        assert_eq!(
            result,
            Err(ActionFailure::Evaluation(EvalError::NotPowerOfTwo(12)))
        );
    }

    #[test]
    fn overflow_detected() {
        let (result, _) = run("ADD($n, 9223372036854775807)", 1);
        assert_eq!(
            result,
            Err(ActionFailure::Evaluation(EvalError::Overflow(Primitive::Add)))
        );
        let (result, _) = run("SHIFT_LEFT($n, 62)", 4);
        assert!(result.is_err());
    }

    #[test]
    fn runtime_operand_kind_error() {
        // IF yields `false` when not taken; ADD then sees a bool.
        let (result, _) = run("ADD(IF(FALSE(), 1), 2)", 0);
        assert_eq!(
            result,
            Err(ActionFailure::Evaluation(EvalError::OperandKind {
                prim: Primitive::Add,
                expected: ValueKind::Int,
                found: ValueKind::Bool,
            }))
        );
    }

    #[test]
    fn not_truthiness() {
        assert_eq!(value("NOT($n)", 0), Value::Bool(true));
        assert_eq!(value("NOT($mode)", 0), Value::Bool(false));
    }

    #[test]
    fn if_skips_untaken_branch() {
        let (result, writes) = run("IF(GT($n, 100), SR_WRITE(\"A\", 1))", 5);
        assert_eq!(result, Ok(Value::Bool(false)));
        assert!(writes.is_empty());
    }

    #[test]
    fn if_else_takes_one_branch() {
        let (_, writes) = run("IF_ELSE(GT($n, 100), SR_WRITE(\"A\", 1), SR_WRITE(\"B\", 2))", 5);
        assert_eq!(writes, vec!["B := 2"]);
    }

    #[test]
    fn and_sequences_writes() {
        let (result, writes) = run("SR_WRITE(\"A\", 1) AND SR_WRITE(\"B\", 0)", 0);
        assert_eq!(result, Ok(Value::Bool(true)));
        assert_eq!(writes, vec!["A := 1", "B := 0"]);
    }

    #[test]
    fn and_short_circuits() {
        let (result, writes) = run("$n AND SR_WRITE(\"A\", 1)", 0);
        assert_eq!(result, Ok(Value::Int(0)));
        assert!(writes.is_empty());
    }

    #[test]
    fn or_chain_takes_first_true_branch() {
        let src = "IF(EQUAL($n, 1), SR_WRITE(\"A\", 1)) \
                   OR IF(GE($n, 1), SR_WRITE(\"A\", 2)) \
                   OR IF(GE($n, 0), SR_WRITE(\"A\", 3))";
        assert_eq!(run(src, 1).1, vec!["A := 1"]);
        assert_eq!(run(src, 5).1, vec!["A := 2"]);
        assert_eq!(run(src, 0).1, vec!["A := 3"]);
        assert!(run(src, -1).1.is_empty());
    }

    #[test]
    fn dynamic_register_target() {
        let (_, writes) = run("SR_WRITE($mode, 7)", 0);
        assert_eq!(writes, vec!["A := 7"]);
    }

    #[test]
    fn dynamic_register_undeclared() {
        let schema = schema();
        let mut diags = Vec::new();
        let compiled = compile(
            "SR_WRITE($mode, 7)",
            ExprContext::Action,
            schema.symbols(),
            "test",
            &mut diags,
        )
        .unwrap();
        let env = store(&schema, 0, "C");
        let result = evaluate(&schema, &compiled.root, &env, &mut Collect::default());
        assert_eq!(
            result,
            Err(ActionFailure::Evaluation(EvalError::UndeclaredRegister("C".into())))
        );
    }

    #[test]
    fn register_value_range() {
        assert_eq!(run("SR_WRITE(\"A\", -1)", 0).1, vec!["A := 4294967295"]);
        let (result, writes) = run("SR_WRITE(\"A\", 4294967296)", 0);
        assert!(matches!(
            result,
            Err(ActionFailure::Evaluation(EvalError::RegisterRange { .. }))
        ));
        assert!(writes.is_empty());
    }

    #[test]
    fn unset_argument() {
        let schema = schema();
        let mut diags = Vec::new();
        let compiled = compile("$mode", ExprContext::Check, schema.symbols(), "test", &mut diags)
            .unwrap();
        let env = ArgumentStore::new(2);
        assert_eq!(
            evaluate_pure(&schema, &compiled.root, &env),
            Err(EvalError::Unset("mode".into()))
        );
    }

    #[test]
    fn pure_context_refuses_writes() {
        let schema = schema();
        let node = Node::Write {
            target: WriteTarget::Static(crate::id::RegisterId(0)),
            value: Box::new(Node::Const(Value::Int(1))),
        };
        let env = store(&schema, 0, "A");
        assert_eq!(
            evaluate_pure(&schema, &node, &env),
            Err(EvalError::EffectInPureContext)
        );
    }
}
