use std::env;

/// Fallback anon key baked into the hosted deployment. Kept so the
/// service still boots against the shared project when the env var is
/// absent — an operational weakness, not a design feature.
const FALLBACK_ANON_KEY: &str =
    "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJyb2xlIjoiYW5vbiIsInJlZiI6Inp6Y3dndnVscG5yZ3RrdmNuaWp5In0.0";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend, e.g. https://<ref>.supabase.co
    pub backend_url: String,
    pub anon_key: String,
    /// Project ref — first host label of the backend URL; namespaces
    /// the cached credential keys (`sb-{ref}-auth-token`).
    pub project_ref: String,
    pub host: String,
    pub port: u16,
    /// Storage bucket holding vehicle photos.
    pub assets_bucket: String,
    pub app_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend_url = required("BACKEND_URL")?;
        let project_ref = project_ref_from_url(&backend_url);
        Ok(Self {
            backend_url,
            anon_key: env::var("BACKEND_ANON_KEY")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| FALLBACK_ANON_KEY.to_string()),
            project_ref,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            assets_bucket: env::var("ASSETS_BUCKET").unwrap_or_else(|_| "assets".into()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

/// `https://zzcwgvulpnrgtkvcnijy.supabase.co` → `zzcwgvulpnrgtkvcnijy`
fn project_ref_from_url(url: &str) -> String {
    let after_scheme = url.find("://").map(|i| &url[i + 3..]).unwrap_or(url);
    let host = after_scheme.split('/').next().unwrap_or(after_scheme);
    host.split('.').next().unwrap_or(host).to_string()
}
