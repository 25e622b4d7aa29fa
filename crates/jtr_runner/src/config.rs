use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

use crate::binding::LaunchMode;

/// User-supplied settings for launching a runner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct RunConfig {
    pub name: String,
    /// Overrides the project name sent along with debugger requests.
    pub project_name: Option<String>,
    pub working_directory: Option<PathBuf>,
    /// Appended to the runner's arguments.
    pub args: Vec<String>,
    pub vm_args: Vec<String>,
    /// Overlaid onto the inherited environment; these entries win.
    pub env: BTreeMap<String, String>,
    /// Shell command to run, to completion, before the runner starts.
    pub pre_launch_task: Option<String>,
    /// Label of the runner's output encoding, e.g. `utf-8` or `windows-1252`.
    pub encoding: Option<String>,
    pub launch_mode: LaunchMode,
    /// Marks the configuration picked when no name is given.
    pub default: bool,
}

impl RunConfig {
    /// The configured output encoding. Unknown labels, and encodings that aren't
    /// ASCII-compatible, fall back to UTF-8.
    pub fn output_encoding(&self) -> &'static encoding_rs::Encoding {
        let Some(label) = &self.encoding else {
            return encoding_rs::UTF_8;
        };
        match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(encoding) if encoding.is_ascii_compatible() => encoding,
            _ => {
                tracing::warn!(
                    encoding = %label,
                    "unsupported runner output encoding; using UTF-8"
                );
                encoding_rs::UTF_8
            }
        }
    }
}
