//! Task descriptors: one input file plus the tool invocation that converts it.
//!
//! Descriptors are built once before the pool starts and only read afterwards.
//! The invocation is a template; the worker substitutes the input path and its
//! private temporary output path when it launches the tool.

use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Stable ordinal of a task within its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationArg {
    Literal(OsString),
    /// Replaced by the task's input path.
    Input,
    /// Replaced by the worker's temporary output path.
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    program: PathBuf,
    args: Vec<InvocationArg>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(InvocationArg::Literal(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args
            .extend(args.into_iter().map(|a| InvocationArg::Literal(a.into())));
        self
    }

    pub fn input(mut self) -> Self {
        self.args.push(InvocationArg::Input);
        self
    }

    pub fn output(mut self) -> Self {
        self.args.push(InvocationArg::Output);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Concrete argument vector for one run.
    pub fn resolve(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg {
                InvocationArg::Literal(s) => s.clone(),
                InvocationArg::Input => input.as_os_str().to_owned(),
                InvocationArg::Output => output.as_os_str().to_owned(),
            })
            .collect()
    }

    pub fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.resolve(input, output));
        cmd
    }

    /// Human-readable command line, for logs.
    pub fn display(&self, input: &Path, output: &Path) -> String {
        shared_utils::format_command_line(
            self.program.as_os_str(),
            self.resolve(input, output).iter().map(OsString::as_os_str),
        )
    }
}

/// One unit of work. Immutable once built.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub input: PathBuf,
    pub invocation: Arc<ToolInvocation>,
}

impl TaskDescriptor {
    pub fn file_name(&self) -> &OsStr {
        self.input.file_name().unwrap_or(self.input.as_os_str())
    }
}

/// Number the inputs in order; every task shares one invocation template.
pub fn build_tasks(inputs: Vec<PathBuf>, invocation: ToolInvocation) -> Vec<TaskDescriptor> {
    let invocation = Arc::new(invocation);
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| TaskDescriptor {
            id: TaskId(i),
            input,
            invocation: Arc::clone(&invocation),
        })
        .collect()
}
