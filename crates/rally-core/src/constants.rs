/// Storage key components shared across crates
pub const STORAGE_NAMESPACE: &str = "rally";

pub const BUDGET_KEY_COMPONENT: &str = "budget";
pub const BUDGET_KEY_PREFIX: &str =
    const_str::concat!(STORAGE_NAMESPACE, ":", BUDGET_KEY_COMPONENT, ":");
