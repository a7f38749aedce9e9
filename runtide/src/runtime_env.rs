//! Environment prelude for bootstrap processes.
//!
//! Standard Lambda SDKs expect the `AWS_LAMBDA_*` variables to be present;
//! the values here are dummies except for `AWS_LAMBDA_RUNTIME_API`, which
//! points the workers at the internal API socket.

use std::collections::BTreeMap;
use std::env;

const RUNTIME_API_HOST: &str = "127.0.0.1";

/// The prepared child environment plus the internal API socket address.
#[derive(Debug)]
pub struct RuntimeEnv {
    vars: BTreeMap<String, String>,
    internal_socket: String,
}

/// Builds the runtime environment for the given internal API port:
/// fixed dummies, the forwarded `_HANDLER` / `LAMBDA_TASK_ROOT`, and
/// `$VAR` references expanded against the process environment.
pub fn prepare(internal_api_port: u16) -> RuntimeEnv {
    let internal_socket = format!("{RUNTIME_API_HOST}:{internal_api_port}");

    let mut vars = BTreeMap::from([
        (
            "LD_LIBRARY_PATH".to_string(),
            "/lib64:/usr/lib64:$LAMBDA_RUNTIME_DIR:$LAMBDA_RUNTIME_DIR/lib:\
             $LAMBDA_TASK_ROOT:$LAMBDA_TASK_ROOT/lib:/opt/lib:$LD_LIBRARY_PATH"
                .to_string(),
        ),
        ("AWS_LAMBDA_RUNTIME_API".to_string(), internal_socket.clone()),
        // Dummy values expected by Lambda SDKs
        ("AWS_LAMBDA_FUNCTION_NAME".to_string(), "foo".to_string()),
        ("AWS_LAMBDA_FUNCTION_MEMORY_SIZE".to_string(), "128".to_string()),
        ("AWS_LAMBDA_FUNCTION_VERSION".to_string(), "0.0.1".to_string()),
        ("AWS_LAMBDA_LOG_GROUP_NAME".to_string(), "foo-group".to_string()),
        ("AWS_LAMBDA_LOG_STREAM_NAME".to_string(), "foo-stream".to_string()),
    ]);

    vars.insert(
        "_HANDLER".to_string(),
        env::var("_HANDLER").unwrap_or_default(),
    );
    vars.insert(
        "LAMBDA_TASK_ROOT".to_string(),
        env::var("LAMBDA_TASK_ROOT").unwrap_or_default(),
    );

    for value in vars.values_mut() {
        *value = expand(value);
    }

    RuntimeEnv {
        vars,
        internal_socket,
    }
}

impl RuntimeEnv {
    /// Exports the prepared variables into the process environment, so both
    /// servers and the spawned workers observe them. Called once, before
    /// anything else starts.
    pub fn apply(&self) {
        for (name, value) in &self.vars {
            env::set_var(name, value);
        }
    }

    /// Socket address the internal API listens on.
    pub fn internal_socket(&self) -> &str {
        &self.internal_socket
    }

    /// Directory holding the `bootstrap` binary.
    pub fn task_root(&self) -> &str {
        self.vars
            .get("LAMBDA_TASK_ROOT")
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Expands `$VAR` and `${VAR}` references against the process environment.
/// Unset variables expand to the empty string; a `$` not followed by a name
/// is kept as-is.
fn expand(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 1..];

        let (name, remainder) = if let Some(braced) = rest.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], &braced[end + 1..]),
                None => {
                    out.push('$');
                    out.push('{');
                    rest = braced;
                    continue;
                }
            }
        } else {
            let end = rest
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(rest.len());
            (&rest[..end], &rest[end..])
        };

        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&env::var(name).unwrap_or_default());
        }
        rest = remainder;
    }

    out.push_str(rest);
    out
}
