pub mod belief;
pub mod model;
pub mod state;

pub struct AppInfo;

impl AppInfo {
    pub const fn name() -> &'static str {
        "cascade"
    }

    pub const fn codename() -> &'static str {
        "Decision Core"
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::AppInfo;

    #[test]
    fn exposes_static_metadata() {
        assert_eq!(AppInfo::name(), "cascade");
        assert_eq!(AppInfo::codename(), "Decision Core");
        assert!(!AppInfo::version().is_empty());
    }
}
