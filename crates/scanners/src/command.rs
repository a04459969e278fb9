//! Command template rendering.
//!
//! Tool invocations are configured as templates such as
//! `{tool_path} -w -s -m {extra_args} {rules_path} {target_path}`. The
//! template is split on whitespace first and each token is substituted
//! afterwards, so substituted values are never re-split: a target path with
//! spaces stays one argument and no shell is involved.

use std::path::Path;

/// Values available to a template.
#[derive(Debug, Clone, Default)]
pub struct Placeholders<'a> {
    pub tool_path: &'a str,
    pub target_path: Option<&'a Path>,
    pub target_name: Option<&'a str>,
    pub pid: Option<u32>,
    pub output_path: Option<&'a Path>,
    pub rules_path: Option<&'a str>,
    pub extra_args: &'a [String],
}

/// A rendered command: program plus argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    /// The template needs a value this target does not have, e.g. `{pid}`
    /// for a file on disk.
    #[error("no value for placeholder {{{0}}}")]
    MissingValue(String),

    #[error("unterminated placeholder in '{0}'")]
    Unterminated(String),

    #[error("command template is empty")]
    Empty,
}

/// Render `template` into a program and arguments.
///
/// A token that is exactly `{extra_args}` expands to zero or more arguments.
pub fn render(template: &str, values: &Placeholders<'_>) -> Result<CommandLine, TemplateError> {
    let mut argv = Vec::new();
    for token in template.split_whitespace() {
        if token == "{extra_args}" {
            argv.extend(values.extra_args.iter().cloned());
            continue;
        }
        argv.push(substitute(token, values)?);
    }

    let mut argv = argv.into_iter();
    let program = argv.next().filter(|p| !p.is_empty()).ok_or(TemplateError::Empty)?;
    Ok(CommandLine {
        program,
        args: argv.collect(),
    })
}

/// Substitute every `{name}` in a single token.
pub fn substitute(token: &str, values: &Placeholders<'_>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| TemplateError::Unterminated(token.to_owned()))?;
        let name = &after[..close];
        out.push_str(&lookup(name, values)?);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn lookup(name: &str, v: &Placeholders<'_>) -> Result<String, TemplateError> {
    let missing = || TemplateError::MissingValue(name.to_owned());
    match name {
        "tool_path" => Ok(v.tool_path.to_owned()),
        "target_path" => v
            .target_path
            .map(|p| p.display().to_string())
            .ok_or_else(missing),
        "target_name" => v.target_name.map(str::to_owned).ok_or_else(missing),
        "pid" => v.pid.map(|p| p.to_string()).ok_or_else(missing),
        "output_path" => v
            .output_path
            .map(|p| p.display().to_string())
            .ok_or_else(missing),
        "rules_path" => v.rules_path.map(str::to_owned).ok_or_else(missing),
        "extra_args" => Ok(v.extra_args.join(" ")),
        other => Err(TemplateError::UnknownPlaceholder(other.to_owned())),
    }
}
