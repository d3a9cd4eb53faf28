use serde::{Deserialize, Serialize};

/// Image generation a pgvector container config is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PgVectorPreset {
    #[default]
    Phidata,
    Agno,
}

impl PgVectorPreset {
    fn image_name(&self) -> &'static str {
        match self {
            PgVectorPreset::Phidata => "phidata/pgvector",
            PgVectorPreset::Agno => "agnohq/pgvector",
        }
    }
}

/// Fields that replace a preset's defaults. `None` keeps the preset value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgVectorDbOverrides {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_name: Option<String>,
    #[serde(default)]
    pub image_tag: Option<String>,
    #[serde(default)]
    pub pg_user: Option<String>,
    #[serde(default)]
    pub pg_password: Option<String>,
    #[serde(default)]
    pub pg_database: Option<String>,
    #[serde(default)]
    pub host_port: Option<u16>,
    #[serde(default)]
    pub container_port: Option<u16>,
}

/// A Postgres + pgvector container. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgVectorDb {
    name: String,
    image_name: String,
    image_tag: String,
    pg_user: String,
    pg_password: String,
    pg_database: String,
    host_port: u16,
    container_port: u16,
}

impl PgVectorDb {
    pub fn new(preset: PgVectorPreset, overrides: PgVectorDbOverrides) -> Self {
        Self {
            name: overrides.name.unwrap_or_else(|| "pgvector".into()),
            image_name: overrides
                .image_name
                .unwrap_or_else(|| preset.image_name().into()),
            image_tag: overrides.image_tag.unwrap_or_else(|| "16".into()),
            pg_user: overrides.pg_user.unwrap_or_else(|| "ai".into()),
            pg_password: overrides.pg_password.unwrap_or_else(|| "ai".into()),
            pg_database: overrides.pg_database.unwrap_or_else(|| "ai".into()),
            host_port: overrides.host_port.unwrap_or(5432),
            container_port: overrides.container_port.unwrap_or(5432),
        }
    }

    pub fn preset(preset: PgVectorPreset) -> Self {
        Self::new(preset, PgVectorDbOverrides::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn image_tag(&self) -> &str {
        &self.image_tag
    }

    pub fn pg_user(&self) -> &str {
        &self.pg_user
    }

    pub fn pg_password(&self) -> &str {
        &self.pg_password
    }

    pub fn pg_database(&self) -> &str {
        &self.pg_database
    }

    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    pub fn container_port(&self) -> u16 {
        self.container_port
    }

    /// `name:tag` reference of the container image.
    pub fn image(&self) -> String {
        format!("{}:{}", self.image_name, self.image_tag)
    }

    /// SQLAlchemy-style URL for reaching the database from the host.
    pub fn db_url(&self, host: &str) -> String {
        format!(
            "postgresql+psycopg://{}:{}@{}:{}/{}",
            self.pg_user, self.pg_password, host, self.host_port, self.pg_database
        )
    }

    pub fn render_compose(&self) -> String {
        format!(
            "services:\n  {name}:\n    image: {image}\n    ports:\n      - \"{host}:{container}\"\n    environment:\n      - POSTGRES_USER={user}\n      - POSTGRES_PASSWORD={password}\n      - POSTGRES_DB={db}\n      - PGDATA=/var/lib/postgresql/data/pgdata\n    volumes:\n      - {name}-data:/var/lib/postgresql/data\nvolumes:\n  {name}-data: {{}}\n",
            name = self.name,
            image = self.image(),
            host = self.host_port,
            container = self.container_port,
            user = self.pg_user,
            password = self.pg_password,
            db = self.pg_database,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overriding_host_port_keeps_other_defaults() {
        let db = PgVectorDb::new(
            PgVectorPreset::Phidata,
            PgVectorDbOverrides {
                host_port: Some(5532),
                ..Default::default()
            },
        );
        let defaults = PgVectorDb::preset(PgVectorPreset::Phidata);

        assert_eq!(db.host_port(), 5532);
        assert_eq!(db.image_name(), defaults.image_name());
        assert_eq!(db.image_tag(), defaults.image_tag());
        assert_eq!(db.pg_user(), "ai");
        assert_eq!(db.pg_password(), "ai");
        assert_eq!(db.pg_database(), "ai");
        assert_eq!(db.container_port(), 5432);
        assert_eq!(db.db_url("localhost"), "postgresql+psycopg://ai:ai@localhost:5532/ai");
    }

    #[test]
    fn supplied_fields_are_kept_verbatim() {
        let db = PgVectorDb::new(
            PgVectorPreset::Agno,
            PgVectorDbOverrides {
                name: Some("agent-app-db".into()),
                image_name: Some("registry.local/pg".into()),
                image_tag: Some("16.4-alpine".into()),
                pg_user: Some("api".into()),
                pg_password: Some(" s3cret ".into()),
                pg_database: Some("Api".into()),
                host_port: Some(15432),
                container_port: Some(6543),
            },
        );
        assert_eq!(db.name(), "agent-app-db");
        assert_eq!(db.image(), "registry.local/pg:16.4-alpine");
        assert_eq!(db.pg_user(), "api");
        assert_eq!(db.pg_password(), " s3cret ");
        assert_eq!(db.pg_database(), "Api");
        assert_eq!(db.host_port(), 15432);
        assert_eq!(db.container_port(), 6543);
    }

    #[test]
    fn presets_differ_only_in_image() {
        let phidata = PgVectorDb::preset(PgVectorPreset::Phidata);
        let agno = PgVectorDb::preset(PgVectorPreset::Agno);
        assert_eq!(phidata.image(), "phidata/pgvector:16");
        assert_eq!(agno.image(), "agnohq/pgvector:16");
        assert_eq!(phidata.host_port(), agno.host_port());
    }

    #[test]
    fn renders_compose() {
        let rendered = PgVectorDb::new(
            PgVectorPreset::Agno,
            PgVectorDbOverrides {
                host_port: Some(5532),
                ..Default::default()
            },
        )
        .render_compose();
        assert!(rendered.contains("services:\n  pgvector:"));
        assert!(rendered.contains("image: agnohq/pgvector:16"));
        assert!(rendered.contains("\"5532:5432\""));
        assert!(rendered.contains("POSTGRES_DB=ai"));
    }
}
