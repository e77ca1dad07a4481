/// Log tags identify which pipeline component emitted a message.
///
/// Tags map 1:1 to the layers and their sub-components so per-component
/// debug filtering can be toggled at runtime.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Data,
    Risk,
    Ai,
    Execution,
    Validator,
    Orders,
    Orchestrator,
}

impl LogTag {
    /// Display label used in the console prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Data => "DATA",
            LogTag::Risk => "RISK",
            LogTag::Ai => "AI",
            LogTag::Execution => "EXEC",
            LogTag::Validator => "VALIDATOR",
            LogTag::Orders => "ORDERS",
            LogTag::Orchestrator => "CYCLE",
        }
    }

    /// Key used for per-tag debug/verbose filtering
    pub fn to_debug_key(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
