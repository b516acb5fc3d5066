//! Plan command

use std::path::PathBuf;

use alpaca_conform::plan::OutlineRow;
use alpaca_conform::PlanSet;
use alpaca_conform_common::DeviceType;
use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::output::{print_info, print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Device type whose plan to list
    pub device_type: DeviceType,

    /// Directory of YAML plans overriding the built-in ones
    #[arg(long)]
    pub plans: Option<PathBuf>,

    /// Leave out the common checks that precede every device plan
    #[arg(long)]
    pub device_only: bool,
}

/// A plan outline row tagged with the plan it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct PlanRow {
    pub plan: String,
    #[serde(flatten)]
    pub step: OutlineRow,
}

impl TableDisplay for PlanRow {
    fn headers() -> Vec<&'static str> {
        vec!["Plan", "Action", "Target", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.plan.clone(),
            format!("{}{}", "  ".repeat(self.step.depth), self.step.action),
            self.step.target.clone(),
            self.step.detail.clone(),
        ]
    }
}

/// Outline rows of the plans a run against `device_type` would execute
pub fn rows(plans: &PlanSet, device_only: bool) -> Vec<PlanRow> {
    let mut selected = Vec::new();
    if !device_only {
        selected.push(&plans.common);
    }
    selected.push(&plans.device);

    let mut rows = Vec::new();
    for plan in selected {
        rows.extend(plan.outline().into_iter().map(|step| PlanRow {
            plan: plan.name.clone(),
            step,
        }));
    }
    rows
}

pub async fn execute(args: PlanArgs, format: OutputFormat) -> Result<()> {
    let plans = PlanSet::resolve(args.device_type, args.plans.as_deref())?;
    if format != OutputFormat::Json && !plans.device.description.is_empty() {
        print_info(&plans.device.description);
    }
    print_list(&rows(&plans, args.device_only), format);
    Ok(())
}
