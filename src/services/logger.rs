use crate::utils::text::display_request_id;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// `WARMREBOOT_LOG_FORMAT=json` switches stderr lines to one JSON object each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("WARMREBOOT_LOG_FORMAT") {
            Ok(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    error: u64,
    warn: u64,
    info: u64,
    debug: u64,
}

impl Counters {
    fn bump(&mut self, level: LogLevel) {
        match level {
            LogLevel::Error => self.error += 1,
            LogLevel::Warn => self.warn += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Debug => self.debug += 1,
        }
    }
}

/// Process log on stderr. Clones and children share one set of counters.
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    scope: Option<String>,
    level: LogLevel,
    format: LogFormat,
    counters: Arc<Mutex<Counters>>,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        let level = std::env::var("WARMREBOOT_LOG_LEVEL")
            .map(|v| LogLevel::parse(&v))
            .unwrap_or(LogLevel::Info);
        Self {
            context: context.to_string(),
            scope: None,
            level,
            format: LogFormat::from_env(),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        let mut child = self.clone();
        if !suffix.is_empty() {
            child.context = format!("{}:{}", self.context, suffix);
        }
        child
    }

    /// Prefixes every message with `On <device> for <request id>: `.
    pub fn scoped(&self, device: &str, request_id: Option<&str>) -> Self {
        let mut scoped = self.clone();
        scoped.scope = Some(format!(
            "On {} for {}",
            device,
            display_request_id(request_id)
        ));
        scoped
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn set_format(&mut self, format: LogFormat) {
        self.format = format;
    }

    fn render(&self, level: LogLevel, message: &str, meta: Option<&serde_json::Value>) -> String {
        let message = match &self.scope {
            Some(scope) => format!("{}: {}", scope, message),
            None => message.to_string(),
        };
        let timestamp = chrono::Utc::now().to_rfc3339();
        let meta = meta.filter(|m| !m.is_null());
        match self.format {
            LogFormat::Json => serde_json::json!({
                "ts": timestamp,
                "level": level.label(),
                "context": self.context,
                "message": message,
                "meta": meta,
            })
            .to_string(),
            LogFormat::Text => {
                let suffix = meta.map(|m| format!(" {}", m)).unwrap_or_default();
                format!(
                    "[{}] {} [{}] {}{}",
                    timestamp,
                    level.label(),
                    self.context,
                    message,
                    suffix
                )
            }
        }
    }

    fn log(&self, level: LogLevel, message: &str, meta: Option<&serde_json::Value>) {
        if level > self.level {
            return;
        }
        if let Ok(mut counters) = self.counters.lock() {
            counters.bump(level);
        }
        eprintln!("{}", self.render(level, message, meta));
    }

    pub fn error(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Debug, message, meta);
    }

    pub fn stats(&self) -> serde_json::Value {
        let counters = self.counters.lock().unwrap_or_else(|err| err.into_inner());
        serde_json::json!({
            "level": format!("{:?}", self.level).to_lowercase(),
            "context": self.context,
            "error": counters.error,
            "warn": counters.warn,
            "info": counters.info,
            "debug": counters.debug,
        })
    }
}
