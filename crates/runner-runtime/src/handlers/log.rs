//! Log capability: runner log lines forwarded into `tracing`.

use crate::capability::Capability;
use crate::host::LogLevel;
use crate::marshal::stringify;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Object, Value};
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone)]
pub struct LogHandler {
    runner_id: String,
}

impl LogHandler {
    pub fn new(runner_id: impl Into<String>) -> Self {
        Self {
            runner_id: runner_id.into(),
        }
    }

    pub fn emit(&self, level: LogLevel, message: &str) {
        let runner = self.runner_id.as_str();
        match level {
            LogLevel::Trace => trace!(target: "runner", runner, "{}", message),
            LogLevel::Debug => debug!(target: "runner", runner, "{}", message),
            LogLevel::Info => info!(target: "runner", runner, "{}", message),
            LogLevel::Warn => warn!(target: "runner", runner, "{}", message),
            LogLevel::Error => error!(target: "runner", runner, "{}", message),
        }
    }
}

/// Render log arguments the way a console would: space separated, strings bare.
pub fn render_args(args: &[Value<'_>]) -> String {
    args.iter().map(stringify).collect::<Vec<_>>().join(" ")
}

pub(crate) fn install<'js>(ctx: &Ctx<'js>, handler: LogHandler) -> rquickjs::Result<()> {
    let object = Object::new(ctx.clone())?;

    let log = handler.clone();
    object.set(
        "log",
        Function::new(ctx.clone(), move |args: Rest<Value<'js>>| {
            log.emit(LogLevel::Info, &render_args(&args.0));
        })?,
    )?;

    object.set(
        "write",
        Function::new(
            ctx.clone(),
            move |level: Value<'js>, args: Rest<Value<'js>>| {
                let level = LogLevel::parse(&stringify(&level));
                handler.emit(level, &render_args(&args.0));
            },
        )?,
    )?;

    ctx.globals().set(Capability::Log.global_name(), object)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_render_args_mixes_strings_and_values() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let args: Vec<Value> = ctx.eval(r#"["fetched", 3, { ok: true }]"#).unwrap();
            assert_eq!(render_args(&args), r#"fetched 3 {"ok":true}"#);
        });
    }
}
