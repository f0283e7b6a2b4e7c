use crate::errors::ReplayError;
use crate::script::{ScriptExecutor, ScriptScope};
use crate::session::ReplaySession;
use crate::stub::CallRecord;
use crate::trace::loader::Trace;
use crate::trace::recording::{BatchRecord, ReplayStep};
use crate::types::DriverPhase;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStep {
    Continue,
    Done,
}

pub fn validate_transition(from: DriverPhase, to: DriverPhase) -> Result<(), ReplayError> {
    use DriverPhase as P;

    let allowed = match from {
        P::Warmup => matches!(to, P::Warmup | P::Running | P::Done),
        P::Running => matches!(to, P::Running | P::Done),
        P::Done => false,
    };

    if !allowed {
        return Err(ReplayError::IllegalTransition(format!(
            "{} -> {}",
            from.as_str(),
            to.as_str()
        )));
    }
    Ok(())
}

/// Steps through a trace one batch per real invocation.
#[derive(Debug, Clone)]
pub struct ReplayDriver {
    batches: Vec<BatchRecord>,
    cursor: usize,
    phase: DriverPhase,
}

impl ReplayDriver {
    pub fn new(batches: Vec<BatchRecord>) -> Self {
        Self {
            batches,
            cursor: 0,
            phase: DriverPhase::Warmup,
        }
    }

    pub fn from_trace(trace: &Trace) -> Self {
        Self::new(trace.batches.clone())
    }

    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn steps_executed(&self) -> usize {
        self.batches[..self.cursor]
            .iter()
            .map(|batch| batch.steps.len())
            .sum()
    }

    /// `real = false` is the untimed warm-up call and does nothing. Each
    /// `real = true` call runs the next batch, or reports `Done` once the
    /// trace is exhausted.
    pub fn invoke(
        &mut self,
        session: &mut ReplaySession,
        executor: &mut dyn ScriptExecutor,
        real: bool,
    ) -> Result<DriverStep, ReplayError> {
        if !real {
            validate_transition(self.phase, DriverPhase::Warmup)?;
            return Ok(DriverStep::Continue);
        }

        let Some(batch) = self.batches.get(self.cursor) else {
            validate_transition(self.phase, DriverPhase::Done)?;
            self.phase = DriverPhase::Done;
            return Ok(DriverStep::Done);
        };
        validate_transition(self.phase, DriverPhase::Running)?;
        self.phase = DriverPhase::Running;
        self.cursor += 1;
        for step in &batch.steps {
            apply_step(session, executor, step)?;
        }
        Ok(DriverStep::Continue)
    }
}

pub fn apply_step(
    session: &mut ReplaySession,
    executor: &mut dyn ScriptExecutor,
    step: &ReplayStep,
) -> Result<(), ReplayError> {
    let window = session.window();
    match step {
        ReplayStep::Assign { target, value } => {
            let value = session.materialize(value)?;
            session.set_path(window, target, value)
        }
        ReplayStep::CreateObject { target } => {
            let object = session.heap_mut().alloc();
            session.set_path(window, target, Value::Object(object))
        }
        ReplayStep::PushReturn { stub, value } => {
            let value = session.materialize(value)?;
            session.push_return(stub, value);
            Ok(())
        }
        ReplayStep::PushCall {
            stub,
            this,
            args,
            value,
        } => {
            let this = session.materialize(this)?;
            let mut recorded = Vec::with_capacity(args.len());
            for arg in args {
                recorded.push(session.materialize(arg)?);
            }
            let value = session.materialize(value)?;
            session.push_call(
                stub,
                CallRecord {
                    this: Some(this),
                    args: recorded,
                },
                value,
            );
            Ok(())
        }
        ReplayStep::DefineGetter {
            target,
            getter,
            setter,
            claim_on_write,
        } => {
            let (owner, prop) = session.resolve_owner(window, target)?;
            if *claim_on_write {
                session.define_regetter(owner, prop, getter, setter.as_deref())
            } else {
                session.define_getter(owner, prop, getter, setter.as_deref())
            }
        }
        ReplayStep::Eval { source, scope } => {
            let object = match scope {
                Some(path) => session
                    .get_path(window, path)?
                    .as_object()
                    .ok_or_else(|| ReplayError::NotAnObject(path.clone()))?,
                None => window,
            };
            session.record_eval();
            executor.execute(source, ScriptScope { session, object })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{validate_transition, DriverStep, ReplayDriver};
    use crate::errors::ReplayError;
    use crate::host::FakeHost;
    use crate::script::{CallScriptExecutor, SourceLog};
    use crate::session::{ReplaySession, SessionOptions};
    use crate::trace::recording::{BatchRecord, ReplayStep};
    use crate::types::DriverPhase;
    use crate::value::Value;
    use serde_json::json;

    fn session() -> ReplaySession {
        ReplaySession::new(&FakeHost::default().headless(), SessionOptions::default())
            .expect("session")
    }

    fn batch(steps: Vec<ReplayStep>) -> BatchRecord {
        BatchRecord { seq: 0, steps }
    }

    #[test]
    fn warmup_then_one_batch_per_real_call() {
        let mut session = session();
        let mut log = SourceLog::default();
        let mut driver = ReplayDriver::new(vec![
            batch(vec![ReplayStep::Assign {
                target: "FOO".to_string(),
                value: json!(1),
            }]),
            batch(vec![ReplayStep::Eval {
                source: "get FOO".to_string(),
                scope: None,
            }]),
        ]);

        assert_eq!(
            driver.invoke(&mut session, &mut log, false),
            Ok(DriverStep::Continue)
        );
        assert_eq!(driver.cursor(), 0);
        let window = session.window();
        assert_eq!(session.heap().data_value(window, "FOO"), None);

        assert_eq!(
            driver.invoke(&mut session, &mut log, true),
            Ok(DriverStep::Continue)
        );
        assert_eq!(
            session.heap().data_value(window, "FOO"),
            Some(&Value::Number(1.0))
        );
        assert_eq!(
            driver.invoke(&mut session, &mut log, true),
            Ok(DriverStep::Continue)
        );
        assert_eq!(log.sources().len(), 1);
        assert_eq!(
            driver.invoke(&mut session, &mut log, true),
            Ok(DriverStep::Done)
        );
        assert_eq!(driver.phase(), DriverPhase::Done);
        assert_eq!(driver.steps_executed(), 2);
    }

    #[test]
    fn warmup_after_running_is_rejected() {
        let mut session = session();
        let mut executor = CallScriptExecutor;
        let mut driver = ReplayDriver::new(vec![batch(vec![]), batch(vec![])]);
        driver
            .invoke(&mut session, &mut executor, true)
            .expect("first batch");
        let err = driver
            .invoke(&mut session, &mut executor, false)
            .expect_err("illegal");
        assert!(matches!(err, ReplayError::IllegalTransition(_)));
    }

    #[test]
    fn invoking_after_done_is_rejected() {
        let mut session = session();
        let mut executor = CallScriptExecutor;
        let mut driver = ReplayDriver::new(Vec::new());
        assert_eq!(
            driver.invoke(&mut session, &mut executor, true),
            Ok(DriverStep::Done)
        );
        assert!(driver.invoke(&mut session, &mut executor, true).is_err());
    }

    #[test]
    fn eval_runs_in_the_named_scope() {
        let mut session = session();
        let mut log = SourceLog::default();
        let mut driver = ReplayDriver::new(vec![batch(vec![
            ReplayStep::CreateObject {
                target: "frame".to_string(),
            },
            ReplayStep::Eval {
                source: "get x".to_string(),
                scope: Some("frame".to_string()),
            },
        ])]);
        driver.invoke(&mut session, &mut log, true).expect("batch");
        let window = session.window();
        let frame = session
            .heap()
            .data_value(window, "frame")
            .and_then(Value::as_object)
            .expect("frame");
        assert_eq!(log.sources()[0].1, frame);
        assert_eq!(session.stats().evals, 1);
    }

    #[test]
    fn define_getter_steps_install_accessors() {
        let mut session = session();
        let mut executor = CallScriptExecutor;
        let mut driver = ReplayDriver::new(vec![batch(vec![
            ReplayStep::PushReturn {
                stub: "g1".to_string(),
                value: json!("c=1"),
            },
            ReplayStep::DefineGetter {
                target: "JSBNG__document.cookie".to_string(),
                getter: "g1".to_string(),
                setter: None,
                claim_on_write: true,
            },
            ReplayStep::Eval {
                source: "expect JSBNG__document.cookie == \"c=1\"".to_string(),
                scope: None,
            },
        ])]);
        driver
            .invoke(&mut session, &mut executor, true)
            .expect("batch");
        assert_eq!(session.stats().getter_reads, 1);
    }

    #[test]
    fn transitions_out_of_done_are_illegal() {
        assert!(validate_transition(DriverPhase::Warmup, DriverPhase::Running).is_ok());
        assert!(validate_transition(DriverPhase::Done, DriverPhase::Running).is_err());
        assert!(validate_transition(DriverPhase::Running, DriverPhase::Warmup).is_err());
    }
}
