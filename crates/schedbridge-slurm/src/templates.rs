//! Slurm batch script templates.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, AdapterResult};

/// Resources and body of a job to generate a batch script for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSpec {
    pub name: String,
    pub account: String,
    pub partition: String,
    /// Falls back to the cluster's default QOS.
    pub qos: Option<String>,
    pub nodes: u32,
    pub cpus_per_task: u32,
    pub gpus: u32,
    pub memory_mb: Option<u64>,
    pub time_limit_minutes: Option<u32>,
    pub work_dir: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    /// Raw `sbatch` options, one per directive line (`--exclusive`).
    pub extra_options: Vec<String>,
    /// Commands to run; a leading shebang is replaced by the generated one.
    pub script: String,
}

/// Generate the batch script submitted for a [`JobSpec`].
pub fn generate_batch_script(spec: &JobSpec, default_qos: &str) -> AdapterResult<String> {
    let mut script = String::new();

    script.push_str("#!/bin/bash\n");

    script.push_str(&format!("#SBATCH --account={}\n", spec.account));
    script.push_str(&format!("#SBATCH --partition={}\n", spec.partition));
    let qos = spec.qos.as_deref().filter(|q| !q.is_empty()).unwrap_or(default_qos);
    script.push_str(&format!("#SBATCH --qos={qos}\n"));
    if !spec.name.is_empty() {
        script.push_str(&format!("#SBATCH --job-name={}\n", sanitize_name(&spec.name)));
    }
    script.push_str(&format!("#SBATCH --nodes={}\n", spec.nodes.max(1)));
    script.push_str(&format!(
        "#SBATCH --cpus-per-task={}\n",
        spec.cpus_per_task.max(1)
    ));
    if spec.gpus > 0 {
        script.push_str(&format!("#SBATCH --gres=gpu:{}\n", spec.gpus));
    }
    if let Some(mem) = spec.memory_mb {
        script.push_str(&format!("#SBATCH --mem={mem}M\n"));
    }
    if let Some(minutes) = spec.time_limit_minutes {
        script.push_str(&format!("#SBATCH --time={}\n", format_time(minutes)));
    }
    if let Some(dir) = &spec.work_dir {
        script.push_str(&format!("#SBATCH --chdir={}\n", single_line("work_dir", dir)?));
    }
    if let Some(output) = &spec.output {
        script.push_str(&format!("#SBATCH --output={}\n", single_line("output", output)?));
    }
    if let Some(error) = &spec.error {
        script.push_str(&format!("#SBATCH --error={}\n", single_line("error", error)?));
    }
    for option in &spec.extra_options {
        let option = single_line("extra_options", option)?.trim();
        if !option.starts_with('-') {
            return Err(AdapterError::InvalidArgument(format!(
                "sbatch option must start with '-': {option}"
            )));
        }
        script.push_str(&format!("#SBATCH {option}\n"));
    }

    script.push('\n');
    script.push_str(strip_shebang(&spec.script));
    if !script.ends_with('\n') {
        script.push('\n');
    }

    Ok(script)
}

/// Working directory for a script submitted from a file path: its directory.
pub fn script_work_dir(script_path: &str) -> Option<String> {
    Path::new(script_path)
        .parent()
        .map(|dir| dir.to_string_lossy().into_owned())
        .filter(|dir| !dir.is_empty())
}

fn strip_shebang(body: &str) -> &str {
    if body.starts_with("#!") {
        body.split_once('\n').map_or("", |(_, rest)| rest)
    } else {
        body
    }
}

fn single_line<'a>(field: &'static str, value: &'a str) -> AdapterResult<&'a str> {
    if value.contains(['\n', '\r']) {
        return Err(AdapterError::InvalidArgument(format!(
            "{field} must not contain line breaks"
        )));
    }
    Ok(value)
}

/// Sanitize a job name for SLURM.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect()
}

/// Format time in minutes to SLURM time format (D-HH:MM:SS or HH:MM:SS).
fn format_time(minutes: u32) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;

    if hours >= 24 {
        let days = hours / 24;
        let remaining_hours = hours % 24;
        format!("{}-{:02}:{:02}:00", days, remaining_hours, mins)
    } else {
        format!("{:02}:{:02}:00", hours, mins)
    }
}
