//! Shell script assembly for artifact injection.
//!
//! Operator-supplied values end up inside double-quoted shell strings, so
//! anything that could break out of one is rejected instead of escaped.
//! The listing filter is a regex and may need those characters, so it is
//! single-quoted instead.

use crate::error::RemoteError;

/// Characters that are live inside a double-quoted shell string.
const FORBIDDEN: [char; 6] = ['"', '`', '$', '\\', '\n', '\r'];

/// Everything needed to render one injection script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectScript<'a> {
    pub dest_dir: &'a str,
    pub bucket: &'a str,
    pub root: &'a str,
    pub key_prefix: &'a str,
    pub files: &'a [String],
    pub preclear: &'a [String],
    pub listing_filter: Option<&'a str>,
}

impl InjectScript<'_> {
    /// `s3://bucket/root/key_prefix/` with exactly one slash between parts.
    pub fn source_prefix(&self) -> String {
        format!(
            "s3://{}/{}{}",
            self.bucket,
            join_prefix(self.root),
            join_prefix(self.key_prefix)
        )
    }

    pub fn validate(&self) -> Result<(), RemoteError> {
        if self.files.is_empty() {
            return Err(RemoteError::InvalidRequest("no files selected".to_string()));
        }
        check_value("destination", self.dest_dir)?;
        if self.dest_dir.trim().is_empty() {
            return Err(RemoteError::InvalidRequest("destination is empty".to_string()));
        }
        check_value("bucket", self.bucket)?;
        check_value("root", self.root)?;
        check_value("key prefix", self.key_prefix)?;
        for file in self.files {
            check_value("file", file)?;
            check_relative(file)?;
        }
        for name in self.preclear {
            check_value("preclear entry", name)?;
            check_relative(name)?;
        }
        Ok(())
    }

    /// Render the script, one statement per line.
    pub fn render(&self) -> Result<String, RemoteError> {
        self.validate()?;

        let mut lines = vec![
            "set -euo pipefail".to_string(),
            format!("DEST=\"{}\"", self.dest_dir),
            "echo \"[INFO] Injecting into $DEST\"".to_string(),
            "test -d \"$DEST\" || { echo \"[ERROR] $DEST does not exist\" >&2; exit 1; }"
                .to_string(),
        ];
        for name in self.preclear {
            lines.push(format!("rm -f \"$DEST/{}\" || true", name));
        }
        let source = self.source_prefix();
        for file in self.files {
            lines.push(format!(
                "aws s3 cp \"{}{}\" \"$DEST/\" --only-show-errors",
                source, file
            ));
        }
        lines.push(match self.listing_filter {
            Some(filter) if !filter.is_empty() => format!(
                "ls -lah \"$DEST\" | grep -E {} || true",
                single_quote(filter)
            ),
            _ => "ls -lah \"$DEST\" || true".to_string(),
        });

        Ok(lines.join("\n"))
    }
}

/// Wrap `script` as a single command line for the remote shell.
pub fn launcher(script: &str, run_as_user: Option<&str>, login_shell: bool) -> String {
    let shell = if login_shell {
        "bash --login -c"
    } else {
        "bash --noprofile --norc -c"
    };
    let command = format!("{} {}", shell, single_quote(script));
    match run_as_user {
        Some(user) if !user.is_empty() => format!("sudo -u {} -H {}", user, command),
        _ => command,
    }
}

/// Quote `value` for a POSIX shell as one word.
pub fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Users are passed unquoted to sudo.
pub fn is_valid_user(user: &str) -> bool {
    !user.is_empty()
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn join_prefix(part: &str) -> String {
    let trimmed = part.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

fn check_value(what: &str, value: &str) -> Result<(), RemoteError> {
    if let Some(c) = value.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(RemoteError::InvalidRequest(format!(
            "{} '{}' contains forbidden character {:?}",
            what,
            value.escape_debug(),
            c
        )));
    }
    Ok(())
}

fn check_relative(path: &str) -> Result<(), RemoteError> {
    if path.trim().is_empty()
        || path.starts_with('/')
        || path.split('/').any(|segment| segment == "..")
    {
        return Err(RemoteError::InvalidRequest(format!(
            "'{}' is not a relative file path",
            path
        )));
    }
    Ok(())
}
