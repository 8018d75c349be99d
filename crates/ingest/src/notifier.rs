use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use framesink_protocol::{FileMetadata, TransferKind};

/// A file that has been fully received and verified.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub path: PathBuf,
    pub file_type: String,
    pub group: Option<String>,
    pub metadata: FileMetadata,
    pub kind: TransferKind,
}

/// Downstream consumer told about each delivered file exactly once.
///
/// Called on a dispatch worker thread; implementations that do slow
/// work should hand it off.
pub trait Notifier: Send + Sync {
    fn notify(&self, delivery: &Delivery);
}

impl<F> Notifier for F
where
    F: Fn(&Delivery) + Send + Sync,
{
    fn notify(&self, delivery: &Delivery) {
        self(delivery)
    }
}

/// Logs each delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, delivery: &Delivery) {
        tracing::info!(
            path = %delivery.path.display(),
            kind = %delivery.kind,
            file_type = %delivery.file_type,
            group = delivery.group.as_deref().unwrap_or(""),
            "file received"
        );
    }
}

/// Runs a shell command for each delivery.
///
/// `{filepath}`, `{filetype}`, `{group}` and `{kind}` in the template
/// are replaced with shell-quoted values.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    template: String,
    shell: PathBuf,
}

impl CommandNotifier {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            shell: PathBuf::from("sh"),
        }
    }

    pub fn with_shell(mut self, shell: impl AsRef<Path>) -> Self {
        self.shell = shell.as_ref().to_path_buf();
        self
    }

    pub fn expand(&self, delivery: &Delivery) -> String {
        self.template
            .replace("{filepath}", &shell_quote(&delivery.path.to_string_lossy()))
            .replace("{filetype}", &shell_quote(&delivery.file_type))
            .replace("{group}", &shell_quote(delivery.group.as_deref().unwrap_or("")))
            .replace("{kind}", delivery.kind.as_str())
    }

    /// Runs the expanded command and waits for it.
    pub fn run(&self, delivery: &Delivery) -> std::io::Result<ExitStatus> {
        let command = self.expand(delivery);
        tracing::debug!(%command, "invoking notify command");
        std::process::Command::new(&self.shell)
            .arg("-c")
            .arg(&command)
            .stdin(std::process::Stdio::null())
            .status()
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, delivery: &Delivery) {
        let this = self.clone();
        let delivery = delivery.clone();
        let spawned = std::thread::Builder::new()
            .name("notify-command".into())
            .spawn(move || match this.run(&delivery) {
                Ok(status) if status.success() => {
                    tracing::debug!(path = %delivery.path.display(), "notify command finished");
                }
                Ok(status) => {
                    tracing::warn!(path = %delivery.path.display(), %status, "notify command failed");
                }
                Err(e) => {
                    tracing::error!(path = %delivery.path.display(), error = %e, "notify command could not start");
                }
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn notify thread");
        }
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
