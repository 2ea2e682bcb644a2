use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use system_utils::{ExternalCommand, ProcessOutput, ProcessRunner};
use tokio::sync::Notify;

enum Scripted {
    Output(ProcessOutput),
    Error(String),
    Gated(ProcessOutput, Arc<Notify>),
}

/// Fake runner that replays scripted results keyed by argv[0] and records
/// every invocation.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<ExternalCommand>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn script(&self, program: &str, exit_codes: &[i32]) {
        for code in exit_codes {
            let output = ProcessOutput {
                exit_code: Some(*code),
                stdout: format!("{program} stdout"),
                stderr: format!("{program} stderr"),
            };
            self.push(program, Scripted::Output(output));
        }
    }

    pub(crate) fn script_error(&self, program: &str, message: &str) {
        self.push(program, Scripted::Error(message.to_string()));
    }

    /// The next call to `program` blocks until `gate` is notified.
    pub(crate) fn script_gated(&self, program: &str, exit_code: i32, gate: Arc<Notify>) {
        self.push(
            program,
            Scripted::Gated(ProcessOutput::with_exit_code(exit_code), gate),
        );
    }

    pub(crate) fn calls(&self) -> Vec<ExternalCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn programs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| call.program().map(str::to_string))
            .collect()
    }

    pub(crate) fn call_count(&self, program: &str) -> usize {
        self.programs().iter().filter(|name| *name == program).count()
    }

    fn push(&self, program: &str, scripted: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(scripted);
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, command: &ExternalCommand) -> anyhow::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let program = command.program().unwrap_or_default().to_string();
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&program)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::Error(message)) => anyhow::bail!(message),
            Some(Scripted::Gated(output, gate)) => {
                gate.notified().await;
                Ok(output)
            }
            None => anyhow::bail!("unexpected call to {program}"),
        }
    }
}

/// Lets spawned tasks run until they block again.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
