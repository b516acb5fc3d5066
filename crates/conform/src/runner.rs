//! Run orchestration: connect, common checks, device plan, cleanup, disconnect

use std::path::{Path, PathBuf};
use std::time::Instant;

use alpaca_conform_common::{device_member_path, ExpectedStatusSet, HttpVerb, Parameter};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ConformConfig;
use crate::error::{ConformError, ConformResult};
use crate::executor::{CallOptions, Transaction, TransactionExecutor};
use crate::ledger::{Ledger, StatusSink};
use crate::plan::{render_path, DevicePlan, PlanParameter, PlanSet, PlanStep, WaitCondition};
use crate::property::{format_value, resolve, values_equal, PropertySource};
use crate::report::RunReport;
use crate::variants::{family, standard_parameters, BusinessParameter};
use crate::wait::{wait_for, wait_while, WaitOutcome};

/// Info message recorded for a gated group that is switched off
pub const OMITTED_MESSAGE: &str = "Test omitted due to configuration setting";

/// Whether a plan should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Executes plan steps against one device
struct PlanInterpreter<'a> {
    config: &'a ConformConfig,
    executor: &'a TransactionExecutor,
    properties: &'a dyn PropertySource,
    cancel: &'a CancellationToken,
}

impl<'a> PlanInterpreter<'a> {
    async fn run_steps(&self, ledger: &mut Ledger, steps: &[PlanStep]) -> ConformResult<Flow> {
        for step in steps {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Stop);
            }
            let flow = self.run_step(ledger, step).await?;
            if flow == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_gated(&self, ledger: &mut Ledger, steps: &[PlanStep]) -> ConformResult<Flow> {
        for step in steps {
            if self.cancel.is_cancelled() {
                return Ok(Flow::Stop);
            }
            if self.run_leaf(ledger, step).await? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_step(&self, ledger: &mut Ledger, step: &PlanStep) -> ConformResult<Flow> {
        match step {
            PlanStep::Gated { gate, label, steps } => {
                if self.config.gate_enabled(*gate) {
                    self.run_gated(ledger, steps).await
                } else {
                    if let Some(label) = label {
                        ledger.info(label, OMITTED_MESSAGE, None);
                    }
                    Ok(Flow::Continue)
                }
            }
            other => self.run_leaf(ledger, other).await,
        }
    }

    /// Run one step that is not a gated group
    async fn run_leaf(&self, ledger: &mut Ledger, step: &PlanStep) -> ConformResult<Flow> {
        match step {
            PlanStep::Get {
                member,
                parameters,
                large_array,
            } => {
                let business = self.business_parameters(parameters).await;
                for variant in family(HttpVerb::Get, &business)? {
                    if self.cancel.is_cancelled() {
                        return Ok(Flow::Stop);
                    }
                    let options = CallOptions {
                        badly_cased_transaction_id: variant.badly_cased_transaction_id,
                        accept_invalid_value: variant.accept_invalid_value,
                        large_array: *large_array,
                        ..CallOptions::default()
                    };
                    let tx = self.executor.transaction(
                        HttpVerb::Get,
                        member,
                        variant.label,
                        variant.parameters,
                        variant.expected,
                    );
                    self.executor.execute(ledger, &tx, options).await;
                }
                Ok(Flow::Continue)
            }

            PlanStep::Put {
                member,
                parameters,
                wait,
            } => {
                let business = self.business_parameters(parameters).await;
                for variant in family(HttpVerb::Put, &business)? {
                    if self.cancel.is_cancelled() {
                        return Ok(Flow::Stop);
                    }
                    let options = CallOptions {
                        badly_cased_transaction_id: variant.badly_cased_transaction_id,
                        accept_invalid_value: variant.accept_invalid_value,
                        ..CallOptions::default()
                    };
                    let expects_success = variant.expects_success();
                    let tx = self.executor.transaction(
                        HttpVerb::Put,
                        member,
                        variant.label,
                        variant.parameters,
                        variant.expected,
                    );
                    let report = self.executor.execute(ledger, &tx, options).await;
                    if let (Some(condition), true) = (wait, expects_success && report.was_sent()) {
                        if self.wait(ledger, member, condition).await? == Flow::Stop {
                            return Ok(Flow::Stop);
                        }
                    }
                }
                Ok(Flow::Continue)
            }

            PlanStep::Call {
                member,
                label,
                verb,
                parameters,
                expect,
                accept_invalid_value,
            } => {
                let mut all = standard_parameters();
                all.extend(parameters.iter().cloned());
                let tx = self
                    .executor
                    .transaction(*verb, member, label.clone(), all, expect.status_set());
                let options = CallOptions {
                    accept_invalid_value: *accept_invalid_value,
                    ..CallOptions::default()
                };
                self.executor.execute(ledger, &tx, options).await;
                Ok(Flow::Continue)
            }

            PlanStep::Raw {
                test,
                label,
                path,
                verb,
                expect,
            } => {
                let device_type = self.executor.device_type();
                let device_number = self.executor.device_number();
                let tx = Transaction {
                    test_name: test.clone(),
                    label: render_path(label, device_type, device_number),
                    path: render_path(path, device_type, device_number),
                    verb: *verb,
                    parameters: standard_parameters(),
                    expected: expect.status_set(),
                };
                self.executor.execute(ledger, &tx, CallOptions::default()).await;
                Ok(Flow::Continue)
            }

            PlanStep::WaitWhile { condition } => self.wait(ledger, &condition.property, condition).await,

            PlanStep::WaitFor { delay, purpose } => {
                let outcome = wait_for(self.config.delay_ms(*delay), purpose, self.cancel, ledger).await;
                Ok(match outcome {
                    WaitOutcome::Completed => Flow::Continue,
                    WaitOutcome::Cancelled => Flow::Stop,
                })
            }

            PlanStep::Assign { target, source } => {
                match self.properties.read(source, &[]).await {
                    Ok(value) => match format_value(&value, None) {
                        Some(text) => {
                            if let Err(e) = self
                                .properties
                                .write(target, &[Parameter::new(target.as_str(), text)])
                                .await
                            {
                                debug!(target = %target, error = %e, "assignment failed");
                            }
                        }
                        None => debug!(source = %source, "value cannot be assigned"),
                    },
                    Err(e) => debug!(source = %source, error = %e, "assignment source unreadable"),
                }
                Ok(Flow::Continue)
            }

            PlanStep::Status { text } => {
                ledger.set_status(text);
                Ok(Flow::Continue)
            }

            PlanStep::Gated { .. } => Err(ConformError::PlanParse("gated groups cannot be nested".into())),
        }
    }

    async fn business_parameters(&self, parameters: &[PlanParameter]) -> Vec<BusinessParameter> {
        let mut business = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let value = resolve(&parameter.value, self.properties, self.config).await;
            let resolved = BusinessParameter::new(parameter.name.as_str(), value);
            business.push(if parameter.test_bad_value {
                resolved
            } else {
                resolved.without_bad_value()
            });
        }
        business
    }

    async fn wait(&self, ledger: &mut Ledger, member: &str, condition: &WaitCondition) -> ConformResult<Flow> {
        let label = condition.label.as_deref().unwrap_or(member);
        let timeout = self.config.timeout_seconds(condition.timeout);
        let properties = self.properties;
        let property = condition.property.as_str();
        let arguments = condition.arguments.as_slice();
        let equals = &condition.equals;

        let outcome = wait_while(
            label,
            || async move {
                let value = properties.read(property, arguments).await?;
                Ok(values_equal(&value, equals))
            },
            condition.poll_ms,
            timeout,
            self.cancel,
            ledger,
        )
        .await?;

        Ok(match outcome {
            WaitOutcome::Completed => Flow::Continue,
            WaitOutcome::Cancelled => Flow::Stop,
        })
    }
}

/// Test name setup faults are recorded under
pub const SETUP_TEST_NAME: &str = "ConformanceCheck";

/// Drives one complete conformance run
pub struct ProtocolRunner {
    config: ConformConfig,
    cancel: CancellationToken,
    status: Option<Box<dyn StatusSink>>,
    plans_dir: Option<PathBuf>,
}

impl ProtocolRunner {
    pub fn new(config: ConformConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            status: None,
            plans_dir: None,
        }
    }

    pub fn with_status_sink(mut self, status: Box<dyn StatusSink>) -> Self {
        self.status = Some(status);
        self
    }

    /// Prefer plans found in `dir` over the built-in ones
    pub fn with_plans_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plans_dir = Some(dir.into());
        self
    }

    /// Run every check and return the classified report.
    ///
    /// Faults while preparing the run are recorded as errors under
    /// `SETUP_TEST_NAME` and end the run before any request is sent.
    pub async fn run(self) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        let device = &self.config.device;
        let url = format!(
            "{}{}",
            device.base_url(),
            device_member_path(device.device_type, device.device_number, "").trim_end_matches('/')
        );

        let mut ledger =
            Ledger::new(self.cancel.clone()).show_success_responses(self.config.alpaca.show_success_responses);
        if let Some(status) = self.status {
            ledger = ledger.with_status_sink(status);
        }

        let prepared = prepare(&self.config, &self.cancel, self.plans_dir.as_deref());
        match prepared {
            Ok((executor, plans)) => {
                info!(
                    "Connecting to device: {}:{} through URL: {}",
                    device.host, device.port, url
                );
                let interpreter = PlanInterpreter {
                    config: &self.config,
                    executor: &executor,
                    properties: &executor,
                    cancel: &self.cancel,
                };
                run_plans(&interpreter, &mut ledger, &plans).await;
            }
            Err(e) => {
                error!(error = %e, "could not prepare the run");
                ledger.error(SETUP_TEST_NAME, &e.to_string(), None);
            }
        }
        ledger.set_status("");

        let interrupted = self.cancel.is_cancelled();
        if interrupted {
            warn!("run cancelled before completion");
        }
        let (errors, issues, information) = ledger.into_entries();
        let report = RunReport {
            device_type: device.device_type,
            device_number: device.device_number,
            url,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            interrupted,
            errors,
            issues,
            information,
        };
        info!(verdict = report.verdict(), "{}", report.summary());
        report
    }
}

/// Build the executor and pick the plans for the configured device
fn prepare(
    config: &ConformConfig,
    cancel: &CancellationToken,
    plans_dir: Option<&Path>,
) -> ConformResult<(TransactionExecutor, PlanSet)> {
    let executor = TransactionExecutor::new(config, cancel.clone())?;
    let plans = PlanSet::resolve(config.device.device_type, plans_dir)?;
    Ok((executor, plans))
}

/// Connect, run the common and device plans with their cleanups, then disconnect
async fn run_plans(interpreter: &PlanInterpreter<'_>, ledger: &mut Ledger, plans: &PlanSet) {
    let executor = interpreter.executor;
    connected(executor, ledger, true).await;

    let common = interpreter.run_steps(ledger, &plans.common.steps).await;
    let main = match common {
        Ok(Flow::Continue) => {
            info!(plan = %plans.device.name, "running device plan");
            interpreter.run_steps(ledger, &plans.device.steps).await
        }
        other => {
            record_fault(ledger, &plans.common, other);
            Ok(Flow::Stop)
        }
    };
    record_fault(ledger, &plans.device, main);

    for plan in [&plans.common, &plans.device] {
        if !plan.cleanup.is_empty() {
            let result = interpreter.run_steps(ledger, &plan.cleanup).await;
            record_fault(ledger, plan, result);
        }
    }

    connected(executor, ledger, false).await;
}

/// Set Connected on the device. Disconnecting is attempted even after cancellation.
async fn connected(executor: &TransactionExecutor, ledger: &mut Ledger, state: bool) {
    let value = if state { "True" } else { "False" };
    let mut parameters = standard_parameters();
    parameters.push(Parameter::new("Connected", value));
    let tx = executor.transaction(HttpVerb::Put, "Connected", value, parameters, ExpectedStatusSet::ok());
    let options = CallOptions {
        ignore_cancellation: !state,
        ..CallOptions::default()
    };
    executor.execute(ledger, &tx, options).await;
}

fn record_fault(ledger: &mut Ledger, plan: &DevicePlan, result: ConformResult<Flow>) {
    match result {
        Ok(_) => {}
        Err(ConformError::WaitTimeout { action, seconds }) => {
            warn!(plan = %plan.name, action = %action, seconds, "plan stopped by a wait timeout");
        }
        Err(e) => ledger.error(&plan.name, &e.to_string(), None),
    }
}
