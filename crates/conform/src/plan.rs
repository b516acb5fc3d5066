//! Declarative device plans
//!
//! Each device type's protocol script is a YAML document. The built-in plans
//! are compiled into the library; a directory of YAML files can replace them.
//!
//! ```yaml
//! name: Focuser
//! device_type: focuser
//! steps:
//!   - action: get
//!     member: Position
//!   - action: put
//!     member: Move
//!     parameters:
//!       - name: Position
//!         value: { property: Position, fallback: "1" }
//!     wait: { property: IsMoving, equals: true, timeout: focuser }
//! ```

use std::path::Path;

use alpaca_conform_common::{DeviceType, ExpectedStatusSet, HttpVerb, Parameter};
use serde::{Deserialize, Serialize};

use crate::config::{DelaySetting, Gate, TimeoutSetting};
use crate::error::{ConformError, ConformResult};
use crate::property::ValueSource;
use crate::wait::MIN_POLL_INTERVAL_MS;

const COMMON_PLAN: &str = include_str!("../plans/common.yaml");

/// Built-in YAML for a device type
fn builtin_source(device_type: DeviceType) -> &'static str {
    match device_type {
        DeviceType::Camera => include_str!("../plans/camera.yaml"),
        DeviceType::CoverCalibrator => include_str!("../plans/covercalibrator.yaml"),
        DeviceType::Dome => include_str!("../plans/dome.yaml"),
        DeviceType::FilterWheel => include_str!("../plans/filterwheel.yaml"),
        DeviceType::Focuser => include_str!("../plans/focuser.yaml"),
        DeviceType::ObservingConditions => include_str!("../plans/observingconditions.yaml"),
        DeviceType::Rotator => include_str!("../plans/rotator.yaml"),
        DeviceType::SafetyMonitor => include_str!("../plans/safetymonitor.yaml"),
        DeviceType::Switch => include_str!("../plans/switch.yaml"),
        DeviceType::Telescope => include_str!("../plans/telescope.yaml"),
    }
}

/// A complete device script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePlan {
    pub name: String,

    /// Device type this plan checks, absent for the common checks
    #[serde(default)]
    pub device_type: Option<DeviceType>,

    #[serde(default)]
    pub description: String,

    pub steps: Vec<PlanStep>,

    /// Steps run after `steps` however they ended
    #[serde(default)]
    pub cleanup: Vec<PlanStep>,
}

/// A member argument whose value is resolved when the step runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanParameter {
    pub name: String,
    pub value: ValueSource,
    /// Also send a malformed value for this argument
    #[serde(default = "default_true")]
    pub test_bad_value: bool,
}

fn default_true() -> bool {
    true
}

fn default_poll_ms() -> u64 {
    500
}

fn default_get() -> HttpVerb {
    HttpVerb::Get
}

fn default_put() -> HttpVerb {
    HttpVerb::Put
}

/// Continue waiting while `property` reads as `equals`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitCondition {
    pub property: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<Parameter>,
    pub equals: serde_json::Value,
    #[serde(default)]
    pub timeout: TimeoutSetting,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// Operation name shown while waiting, defaults to the member name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Expected status set of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    Any,
    #[default]
    Ok,
    BadRequest,
    ClientError,
}

impl Expect {
    pub fn status_set(&self) -> ExpectedStatusSet {
        match self {
            Expect::Any => ExpectedStatusSet::any(),
            Expect::Ok => ExpectedStatusSet::ok(),
            Expect::BadRequest => ExpectedStatusSet::bad_request(),
            Expect::ClientError => ExpectedStatusSet::client_error(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanStep {
    /// GET variant family
    Get {
        member: String,
        #[serde(default)]
        parameters: Vec<PlanParameter>,
        /// Image array member, sent with the transfer headers
        #[serde(default)]
        large_array: bool,
    },

    /// PUT variant family, each successful variant followed by `wait`
    Put {
        member: String,
        #[serde(default)]
        parameters: Vec<PlanParameter>,
        #[serde(default)]
        wait: Option<WaitCondition>,
    },

    /// One request with fixed parameters after the standard identifiers
    Call {
        member: String,
        label: String,
        #[serde(default = "default_put")]
        verb: HttpVerb,
        #[serde(default)]
        parameters: Vec<Parameter>,
        #[serde(default)]
        expect: Expect,
        #[serde(default)]
        accept_invalid_value: bool,
    },

    /// One request to a raw path template
    Raw {
        test: String,
        label: String,
        path: String,
        #[serde(default = "default_get")]
        verb: HttpVerb,
        #[serde(default)]
        expect: Expect,
    },

    WaitWhile {
        condition: WaitCondition,
    },

    /// Unconditional configured delay
    WaitFor {
        delay: DelaySetting,
        purpose: String,
    },

    /// Write the live value of `source` to `target` without recording anything
    Assign {
        target: String,
        source: String,
    },

    Status {
        text: String,
    },

    /// Steps enabled by a configuration gate
    Gated {
        gate: Gate,
        #[serde(default)]
        label: Option<String>,
        steps: Vec<PlanStep>,
    },
}

/// One line of a plan listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineRow {
    pub depth: usize,
    pub action: String,
    pub target: String,
    pub detail: String,
}

impl PlanStep {
    pub fn action(&self) -> &'static str {
        match self {
            PlanStep::Get { .. } => "get",
            PlanStep::Put { .. } => "put",
            PlanStep::Call { .. } => "call",
            PlanStep::Raw { .. } => "raw",
            PlanStep::WaitWhile { .. } => "wait_while",
            PlanStep::WaitFor { .. } => "wait_for",
            PlanStep::Assign { .. } => "assign",
            PlanStep::Status { .. } => "status",
            PlanStep::Gated { .. } => "gated",
        }
    }

    fn outline(&self, depth: usize, rows: &mut Vec<OutlineRow>) {
        let parameters = |parameters: &[PlanParameter]| {
            parameters
                .iter()
                .map(|p| format!("{}={}", p.name, p.value.describe()))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let condition = |c: &WaitCondition| {
            format!("while {} == {} ({:?} timeout)", c.property, c.equals, c.timeout)
        };
        let (target, detail) = match self {
            PlanStep::Get {
                member,
                parameters: p,
                large_array,
            } => {
                let mut detail = parameters(p);
                if *large_array {
                    detail = format!("{} [large array]", detail).trim().to_string();
                }
                (format!("GET {}", member), detail)
            }
            PlanStep::Put {
                member,
                parameters: p,
                wait,
            } => {
                let mut detail = parameters(p);
                if let Some(wait) = wait {
                    detail = format!("{} {}", detail, condition(wait)).trim().to_string();
                }
                (format!("PUT {}", member), detail)
            }
            PlanStep::Call {
                member,
                label,
                verb,
                parameters,
                expect,
                ..
            } => {
                let values = parameters
                    .iter()
                    .map(|p| format!("{}={:?}", p.name, p.value))
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    format!("{} {}", verb, member),
                    format!("{}: {} expect {:?}", label, values, expect),
                )
            }
            PlanStep::Raw {
                test,
                label,
                path,
                expect,
                ..
            } => (test.clone(), format!("{}: {} expect {:?}", label, path, expect)),
            PlanStep::WaitWhile { condition: c } => (c.property.clone(), condition(c)),
            PlanStep::WaitFor { delay, purpose } => (purpose.clone(), format!("{:?}", delay)),
            PlanStep::Assign { target, source } => (target.clone(), format!("from {}", source)),
            PlanStep::Status { text } => (String::new(), text.clone()),
            PlanStep::Gated { gate, label, .. } => (
                label.clone().unwrap_or_default(),
                format!("gate {:?}", gate),
            ),
        };
        rows.push(OutlineRow {
            depth,
            action: self.action().to_string(),
            target,
            detail,
        });
        if let PlanStep::Gated { steps, .. } = self {
            for step in steps {
                step.outline(depth + 1, rows);
            }
        }
    }

    fn validate(&self, nested: bool) -> ConformResult<()> {
        let check_count = |member: &str, count: usize| {
            if count > 2 {
                Err(ConformError::PlanParse(format!(
                    "{} has {} parameters, at most two are supported",
                    member, count
                )))
            } else {
                Ok(())
            }
        };
        let check_wait = |condition: &WaitCondition| {
            if condition.poll_ms < MIN_POLL_INTERVAL_MS {
                Err(ConformError::PlanParse(format!(
                    "wait on {} polls every {} ms, the minimum is {} ms",
                    condition.property, condition.poll_ms, MIN_POLL_INTERVAL_MS
                )))
            } else {
                Ok(())
            }
        };
        match self {
            PlanStep::Get { member, parameters, .. } => check_count(member, parameters.len()),
            PlanStep::Put {
                member,
                parameters,
                wait,
            } => {
                check_count(member, parameters.len())?;
                wait.as_ref().map(check_wait).transpose().map(|_| ())
            }
            PlanStep::WaitWhile { condition } => check_wait(condition),
            PlanStep::Raw { path, .. } if !path.starts_with('/') => Err(ConformError::PlanParse(format!(
                "raw path {} must start with /",
                path
            ))),
            PlanStep::Gated { steps, .. } => {
                if nested {
                    return Err(ConformError::PlanParse("gated groups cannot be nested".into()));
                }
                steps.iter().try_for_each(|step| step.validate(true))
            }
            _ => Ok(()),
        }
    }
}

/// Expand `{device_type}`, `{device_type_upper}` and `{device_number}`
pub fn render_path(template: &str, device_type: DeviceType, device_number: u32) -> String {
    template
        .replace("{device_type_upper}", &device_type.to_string().to_uppercase())
        .replace("{device_type}", device_type.api_name())
        .replace("{device_number}", &device_number.to_string())
}

impl DevicePlan {
    /// Parse and validate a plan from YAML
    pub fn from_yaml(yaml: &str) -> ConformResult<Self> {
        let plan: Self = serde_yaml::from_str(yaml)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn from_file(path: &Path) -> ConformResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| ConformError::PlanParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all plans from a directory
    pub fn load_all(dir: &Path) -> ConformResult<Vec<Self>> {
        let mut plans = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            plans.push(Self::from_file(entry.path())?);
        }
        Ok(plans)
    }

    /// Compiled-in plan for a device type
    pub fn builtin(device_type: DeviceType) -> ConformResult<Self> {
        Self::from_yaml(builtin_source(device_type))
    }

    /// Compiled-in checks that run before every device plan
    pub fn common() -> ConformResult<Self> {
        Self::from_yaml(COMMON_PLAN)
    }

    pub fn validate(&self) -> ConformResult<()> {
        for step in self.steps.iter().chain(&self.cleanup) {
            step.validate(false)?;
        }
        Ok(())
    }

    /// Flattened listing of steps, cleanup last
    pub fn outline(&self) -> Vec<OutlineRow> {
        let mut rows = Vec::new();
        for step in &self.steps {
            step.outline(0, &mut rows);
        }
        if !self.cleanup.is_empty() {
            rows.push(OutlineRow {
                depth: 0,
                action: "cleanup".to_string(),
                target: String::new(),
                detail: String::new(),
            });
            for step in &self.cleanup {
                step.outline(1, &mut rows);
            }
        }
        rows
    }
}

/// The common checks and the device plan for one run
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSet {
    pub common: DevicePlan,
    pub device: DevicePlan,
}

impl PlanSet {
    /// Plans for `device_type`. Plans found in `plans_dir` take precedence
    /// over the built-in ones; a plan without a device type replaces the
    /// common checks.
    pub fn resolve(device_type: DeviceType, plans_dir: Option<&Path>) -> ConformResult<Self> {
        let mut common = None;
        let mut device = None;
        if let Some(dir) = plans_dir {
            for plan in DevicePlan::load_all(dir)? {
                match plan.device_type {
                    None => common = Some(plan),
                    Some(t) if t == device_type => device = Some(plan),
                    Some(_) => {}
                }
            }
        }
        let common = match common {
            Some(plan) => plan,
            None => DevicePlan::common()?,
        };
        let device = match device {
            Some(plan) => plan,
            None => DevicePlan::builtin(device_type)?,
        };
        Ok(Self { common, device })
    }
}
