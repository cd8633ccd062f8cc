use strata_core::plan::explicit_paths;
use strata_core::{
    BuildPlan, BuildStep, FileSet, LaunchDescriptor, StepInputs, normalize_context_path,
};

/// Renders a [`BuildPlan`] as the equivalent Dockerfile.
pub struct DockerfileGenerator<'a> {
    plan: &'a BuildPlan,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(plan: &'a BuildPlan) -> Self {
        Self { plan }
    }

    pub fn render(&self) -> String {
        let mut out = String::from(
            "# Generated by strata. Keep the dependency manifest COPY and its\n\
             # install RUN ahead of the source COPY so source edits reuse the\n\
             # dependency layer.\n",
        );
        let mut workdir = "/";

        for step in &self.plan.steps {
            if !matches!(step.inputs, StepInputs::Image { .. }) && step.workdir != workdir {
                workdir = step.workdir.as_str();
                out.push_str(&format!("WORKDIR {workdir}\n"));
            }
            out.push_str(&instruction(step));
            out.push('\n');
        }

        let cmd: Vec<String> = self
            .plan
            .launch
            .argv()
            .into_iter()
            .map(|arg| serde_json::Value::String(arg).to_string())
            .collect();
        out.push_str(&format!("CMD [{}]\n", cmd.join(", ")));
        out
    }
}

fn instruction(step: &BuildStep) -> String {
    match &step.inputs {
        StepInputs::Image { reference } => format!("FROM {reference}"),
        StepInputs::Files {
            files: FileSet::Only(paths),
            destination,
        } => {
            // Docker requires a directory destination for several sources.
            let dest = if paths.len() > 1 && !destination.ends_with('/') {
                format!("{destination}/")
            } else {
                destination.clone()
            };
            format!("COPY {} {dest}", paths.join(" "))
        }
        StepInputs::Files {
            files: FileSet::AllExcept(_),
            destination,
        } => format!("COPY . {destination}"),
        StepInputs::Command { command } => format!("RUN {command}"),
        StepInputs::Port { port } => format!("EXPOSE {port}"),
    }
}

/// Parses a Dockerfile written in the instruction subset strata builds:
/// `FROM`, `WORKDIR`, `COPY`, `RUN`, `EXPOSE` and `CMD`.
///
/// `COPY . <dest>` following explicit copies means "the rest of the
/// context": paths copied earlier are excluded from it. The result is
/// validated like any other plan.
pub fn parse_dockerfile(content: &str) -> Result<BuildPlan, DockerfileError> {
    let mut steps = Vec::new();
    let mut launch = None;
    let mut workdir = "/".to_owned();

    for (line, text) in logical_lines(content) {
        let (keyword, rest) = match text.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (text.as_str(), ""),
        };
        let keyword = keyword.to_ascii_uppercase();
        if rest.is_empty() {
            return Err(parse_error(line, format!("{keyword} requires an argument")));
        }

        match keyword.as_str() {
            "FROM" => {
                if rest.starts_with("--") {
                    return Err(parse_error(line, "FROM flags are not supported"));
                }
                let mut parts = rest.split_whitespace();
                let reference = parts.next().unwrap_or(rest);
                match (parts.next(), parts.next(), parts.next()) {
                    (None, _, _) => {}
                    (Some(kw), Some(_), None) if kw.eq_ignore_ascii_case("as") => {}
                    _ => return Err(parse_error(line, "expected FROM <image> [AS <name>]")),
                }
                steps.push(BuildStep::set_base(reference));
            }
            "WORKDIR" => {
                workdir = if rest.starts_with('/') {
                    rest.to_owned()
                } else {
                    format!("{}/{rest}", workdir.trim_end_matches('/'))
                };
            }
            "COPY" => {
                if rest.starts_with("--") {
                    return Err(parse_error(line, "COPY flags are not supported"));
                }
                let mut args = words(line, rest)?;
                if args.len() < 2 {
                    return Err(parse_error(line, "COPY requires a source and a destination"));
                }
                let destination = normalize_destination(args.pop().unwrap_or_default());
                let sources = args
                    .iter()
                    .map(|src| normalize_context_path(src))
                    .collect::<strata_core::Result<Vec<_>>>()
                    .map_err(|e| parse_error(line, e.to_string()))?;

                let files = if sources.iter().any(|src| src == ".") {
                    if sources.len() > 1 {
                        return Err(parse_error(line, "COPY . cannot be combined with other sources"));
                    }
                    FileSet::AllExcept(explicit_paths(&steps))
                } else {
                    FileSet::Only(sources)
                };
                steps.push(BuildStep::copy(files, destination, workdir.clone()));
            }
            "RUN" => {
                if rest.starts_with('[') {
                    return Err(parse_error(line, "RUN exec form is not supported; use shell form"));
                }
                steps.push(BuildStep::run(rest, workdir.clone()));
            }
            "EXPOSE" => {
                let mut ports = rest.split_whitespace();
                let port = ports.next().unwrap_or(rest);
                if ports.next().is_some() {
                    return Err(parse_error(line, "only one EXPOSE port is supported"));
                }
                let port = port.strip_suffix("/tcp").unwrap_or(port);
                let port: u16 = port
                    .parse()
                    .map_err(|_| parse_error(line, format!("invalid port {port:?}")))?;
                steps.push(BuildStep::declare_port(port, workdir.clone()));
            }
            "CMD" => {
                if launch.is_some() {
                    return Err(parse_error(line, "only one CMD is supported"));
                }
                launch = Some(parse_launch(line, &words(line, rest)?)?);
            }
            _ => {
                return Err(DockerfileError::Unsupported {
                    line,
                    instruction: keyword,
                });
            }
        }
    }

    let plan = BuildPlan {
        steps,
        launch: launch.ok_or(DockerfileError::MissingCmd)?,
    };
    plan.validate()?;
    Ok(plan)
}

/// Joins `\` continuations and drops blanks and comments. Yields the
/// 1-based line each instruction starts on.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if current.is_none() && (trimmed.is_empty() || trimmed.starts_with('#')) {
            continue;
        }
        if current.is_some() && trimmed.starts_with('#') {
            continue;
        }

        let (start, mut text) = current.take().unwrap_or((idx + 1, String::new()));
        match trimmed.strip_suffix('\\') {
            Some(head) => {
                text.push_str(head.trim_end());
                text.push(' ');
                current = Some((start, text));
            }
            None => {
                text.push_str(trimmed);
                lines.push((start, text.trim().to_owned()));
            }
        }
    }
    if let Some((start, text)) = current {
        lines.push((start, text.trim().to_owned()));
    }
    lines
}

/// Splits instruction arguments in JSON array form or on whitespace.
fn words(line: usize, rest: &str) -> Result<Vec<String>, DockerfileError> {
    if rest.starts_with('[') {
        serde_json::from_str(rest)
            .map_err(|e| parse_error(line, format!("invalid JSON argument list: {e}")))
    } else {
        Ok(rest.split_whitespace().map(str::to_owned).collect())
    }
}

fn normalize_destination(dest: String) -> String {
    match dest.as_str() {
        "/" | "." => dest,
        "./" => ".".to_owned(),
        _ => dest.trim_end_matches('/').to_owned(),
    }
}

/// Reads `<tool> <entrypoint> --host H --port P` (flags in any order,
/// `--flag=value` accepted).
fn parse_launch(line: usize, argv: &[String]) -> Result<LaunchDescriptor, DockerfileError> {
    let [tool, entrypoint, flags @ ..] = argv else {
        return Err(parse_error(line, "CMD must name a server tool and an entry point"));
    };

    let mut host = None;
    let mut port = None;
    let mut iter = flags.iter();
    while let Some(flag) = iter.next() {
        let (name, inline) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value.to_owned())),
            None => (flag.as_str(), None),
        };
        let value = match inline {
            Some(value) => value,
            None => iter
                .next()
                .cloned()
                .ok_or_else(|| parse_error(line, format!("{name} requires a value")))?,
        };
        match name {
            "--host" => host = Some(value),
            "--port" => {
                port = Some(
                    value
                        .parse::<u16>()
                        .map_err(|_| parse_error(line, format!("invalid port {value:?}")))?,
                )
            }
            other => return Err(parse_error(line, format!("unsupported CMD argument {other}"))),
        }
    }

    Ok(LaunchDescriptor {
        server_tool: tool.clone(),
        entrypoint: entrypoint.clone(),
        listen_host: host.ok_or_else(|| parse_error(line, "CMD is missing --host"))?,
        listen_port: port.ok_or_else(|| parse_error(line, "CMD is missing --port"))?,
    })
}

fn parse_error(line: usize, reason: impl Into<String>) -> DockerfileError {
    DockerfileError::Parse {
        line,
        reason: reason.into(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DockerfileError {
    #[error("Dockerfile line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("Dockerfile line {line}: unsupported instruction {instruction}")]
    Unsupported { line: usize, instruction: String },
    #[error("Dockerfile has no CMD; expected CMD [\"<tool>\", \"<entrypoint>\", \"--host\", ..., \"--port\", ...]")]
    MissingCmd,
    #[error("Dockerfile describes an invalid build plan: {0}")]
    InvalidPlan(#[from] strata_core::Error),
}
