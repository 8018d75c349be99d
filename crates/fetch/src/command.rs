use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{MountRemap, PullConfig, resolve_username};
use crate::method::TransferMethod;

/// A program and its arguments, run without a shell.
///
/// `Display` masks the password in the argument at `secret`, so the
/// rendered text is safe for logs and error replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Index of a `user,password` login argument.
    pub secret: Option<usize>,
}

impl CommandLine {
    pub fn to_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for (i, arg) in self.args.iter().enumerate() {
            let arg = arg.to_string_lossy();
            let masked;
            let arg: &str = match arg.split_once(',') {
                Some((user, _)) if self.secret == Some(i) => {
                    masked = format!("{user},***");
                    &masked
                }
                _ => &arg,
            };
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Applies the mount remap to a `copy` source path.
///
/// The remote prefix must match whole path components; other paths
/// are returned unchanged.
pub fn remap_source(remote_path: &str, remap: Option<&MountRemap>) -> PathBuf {
    let path = Path::new(remote_path);
    match remap.and_then(|r| path.strip_prefix(&r.remote_prefix).ok().map(|rest| (r, rest))) {
        Some((remap, rest)) => remap.local_prefix.join(rest),
        None => path.to_path_buf(),
    }
}

/// Builds the command that fetches `remote_path` into `dest`.
pub fn build_command(
    method: TransferMethod,
    config: &PullConfig,
    remote_path: &str,
    dest: &Path,
) -> CommandLine {
    match method {
        TransferMethod::Copy => {
            let source = remap_source(remote_path, config.mount_remap.as_ref());
            CommandLine {
                program: config.tools.cp.clone(),
                args: vec![source.into_os_string(), dest.as_os_str().to_owned()],
                secret: None,
            }
        }
        TransferMethod::Scp => {
            let user = resolve_username(config.username.as_deref());
            let mut args: Vec<OsString> = vec!["-B".into()];
            if let Some(port) = config.port {
                args.push("-P".into());
                args.push(port.to_string().into());
            }
            args.push(format!("{user}@{}:{remote_path}", config.host).into());
            args.push(dest.as_os_str().to_owned());
            CommandLine {
                program: config.tools.scp.clone(),
                args,
                secret: None,
            }
        }
        staged => {
            let retry = &config.retry;
            let mut setup = format!(
                "set xfer:log yes; set net:max-retries {}; set net:reconnect-interval-max {}; \
                 set net:reconnect-interval-base {}; set xfer:disk-full-fatal true;",
                retry.max_retries, retry.backoff_max_secs, retry.backoff_base_secs
            );
            let extra = staged.lftp_settings();
            if !extra.is_empty() {
                setup.push(' ');
                setup.push_str(extra);
            }
            let script = format!(
                "{setup} get {} -o {}; exit",
                lftp_quote(remote_path),
                lftp_quote(&dest.to_string_lossy())
            );

            let user = resolve_username(config.username.as_deref());
            let (login, secret) = match config.password.as_deref().filter(|p| !p.is_empty()) {
                Some(password) => (format!("{user},{password}"), Some(3)),
                None => (user, None),
            };

            let url = match config.port {
                Some(port) => format!("{staged}://{}:{port}", config.host),
                None => format!("{staged}://{}", config.host),
            };

            CommandLine {
                program: config.tools.lftp.clone(),
                args: vec![
                    "-e".into(),
                    script.into(),
                    "-u".into(),
                    login.into(),
                    url.into(),
                ],
                secret,
            }
        }
    }
}

fn lftp_quote(path: &str) -> String {
    if path.contains(|c: char| c.is_whitespace() || c == ';' || c == '"') {
        format!("\"{}\"", path.replace('"', "\\\""))
    } else {
        path.to_string()
    }
}
