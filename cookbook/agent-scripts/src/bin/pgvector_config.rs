//! Prints the pgvector container and index setup without touching a database.

use agno_cookbook::{
    init_logging, AppConfig, Distance, IvfflatIndex, PgVectorDb, PgVectorDbOverrides,
    PgVectorPreset, PgVectorSettings, Result, VectorIndex,
};

fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    init_logging(&config.logging)?;

    let db = PgVectorDb::new(
        PgVectorPreset::Agno,
        PgVectorDbOverrides {
            host_port: Some(5532),
            ..Default::default()
        },
    );
    print!("{}", db.render_compose());

    let settings = PgVectorSettings::new("recipes", db.db_url("localhost"))?
        .with_distance(Distance::L2)
        .with_index(VectorIndex::Ivfflat(IvfflatIndex::default()));
    println!("\n-- {}", settings.qualified_table());
    for statement in settings.index_statements(250_000) {
        println!("{statement}");
    }
    Ok(())
}
