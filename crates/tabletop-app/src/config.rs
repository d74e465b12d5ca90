//! Command line and environment configuration.

use clap::Parser;
use kurbo::Size;
use std::path::PathBuf;
use std::time::Duration;
use tabletop_core::Role;
use tabletop_core::api::DEFAULT_API_URL;
use tabletop_core::connection::DEFAULT_WS_URL;

/// Application configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "tabletop", about = "Headless tabletop admin/viewer client")]
pub struct AppConfig {
    /// Scene socket URL.
    #[arg(long, env = "TABLETOP_SERVER", default_value = DEFAULT_WS_URL)]
    pub server: String,

    /// REST API base URL.
    #[arg(long, env = "TABLETOP_API", default_value = DEFAULT_API_URL)]
    pub api: String,

    /// `admin` pushes scenes; `viewer` only follows them.
    #[arg(long, env = "TABLETOP_ROLE", default_value = "viewer", value_parser = parse_role)]
    pub role: Role,

    /// Viewport as `WIDTHxHEIGHT` in pixels.
    #[arg(long, env = "TABLETOP_VIEWPORT", default_value = "1280x720", value_parser = parse_viewport)]
    pub viewport: Size,

    /// Scene file to push once connected (admin only).
    #[arg(long, env = "TABLETOP_SCENE")]
    pub scene: Option<PathBuf>,

    /// Saved scene id to fetch from the API and push (admin only).
    #[arg(long, conflicts_with = "scene")]
    pub load_scene: Option<String>,

    /// Auth token; stored for later runs.
    #[arg(long, env = "TABLETOP_TOKEN")]
    pub token: Option<String>,

    /// Initial display scale; stored for later runs.
    #[arg(long)]
    pub display_scale: Option<f64>,

    /// Preference directory. Defaults to the platform config dir.
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Stop after this many seconds.
    #[arg(long)]
    pub exit_after: Option<u64>,
}

impl AppConfig {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn run_limit(&self) -> Option<Duration> {
        self.exit_after.map(Duration::from_secs)
    }
}

fn parse_role(value: &str) -> Result<Role, String> {
    match value.to_ascii_lowercase().as_str() {
        "admin" => Ok(Role::Admin),
        "viewer" => Ok(Role::Viewer),
        other => Err(format!("unknown role '{other}', expected admin or viewer")),
    }
}

fn parse_viewport(value: &str) -> Result<Size, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width: f64 = w.trim().parse().map_err(|_| format!("invalid width '{w}'"))?;
    let height: f64 = h.trim().parse().map_err(|_| format!("invalid height '{h}'"))?;
    if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
        return Err(format!("viewport must be positive, got '{value}'"));
    }
    Ok(Size::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_viewport() {
        assert_eq!(parse_viewport("1920x1080").unwrap(), Size::new(1920.0, 1080.0));
        assert_eq!(parse_viewport("800X600").unwrap(), Size::new(800.0, 600.0));
        assert!(parse_viewport("1920").is_err());
        assert!(parse_viewport("0x600").is_err());
        assert!(parse_viewport("wide x tall").is_err());
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role("Admin").unwrap(), Role::Admin);
        assert_eq!(parse_role("viewer").unwrap(), Role::Viewer);
        assert!(parse_role("dm").is_err());
    }

    #[test]
    fn test_cli_defaults() {
        let config = AppConfig::try_parse_from(["tabletop"]).unwrap();
        assert_eq!(config.role, Role::Viewer);
        assert_eq!(config.viewport, Size::new(1280.0, 720.0));
        assert!(config.run_limit().is_none());
    }

    #[test]
    fn test_cli_admin_args() {
        let config = AppConfig::try_parse_from([
            "tabletop",
            "--role",
            "admin",
            "--server",
            "ws://table.local:8000/ws",
            "--viewport",
            "1024x768",
            "--exit-after",
            "3",
        ])
        .unwrap();
        assert!(config.is_admin());
        assert_eq!(config.server, "ws://table.local:8000/ws");
        assert_eq!(config.run_limit(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_scene_sources_conflict() {
        let result = AppConfig::try_parse_from([
            "tabletop",
            "--scene",
            "crypt.json",
            "--load-scene",
            "abc",
        ]);
        assert!(result.is_err());
    }
}
