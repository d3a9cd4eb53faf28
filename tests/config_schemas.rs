use agno_cookbook::{
    current_utc_seconds_str, current_utc_str, ApiResponse, ApiStatus, Distance, IndexType,
    MemoryRetrieval, PgVectorDb, PgVectorDbOverrides, PgVectorPreset, PgVectorSettings,
    SearchType, VectorIndex,
};
use regex::Regex;

#[test]
fn test_default_envelope() {
    let envelope = ApiResponse::default();
    assert_eq!(envelope.status, ApiStatus::Fail);
    assert_eq!(envelope.message, "invalid request");
    assert!(envelope.message_log.is_none());
}

#[test]
fn test_pgvector_host_port_override() {
    let db = PgVectorDb::new(
        PgVectorPreset::Phidata,
        PgVectorDbOverrides {
            host_port: Some(5532),
            ..Default::default()
        },
    );
    assert_eq!(db.host_port(), 5532);
    assert_eq!(db.container_port(), 5432);
    assert_eq!(
        (db.pg_user(), db.pg_password(), db.pg_database()),
        ("ai", "ai", "ai")
    );
}

#[test]
fn test_closed_enums_round_trip() {
    for distance in [Distance::Cosine, Distance::L2, Distance::MaxInnerProduct] {
        assert_eq!(distance.to_string().parse::<Distance>().unwrap(), distance);
    }
    for search in [SearchType::Vector, SearchType::Keyword, SearchType::Hybrid] {
        assert_eq!(search.to_string().parse::<SearchType>().unwrap(), search);
    }
    for index in [IndexType::Hnsw, IndexType::Ivfflat, IndexType::Flat] {
        assert_eq!(index.to_string().parse::<IndexType>().unwrap(), index);
    }
    assert!("manhattan".parse::<Distance>().is_err());
    assert!("fuzzy".parse::<SearchType>().is_err());
    assert!("ivf".parse::<IndexType>().is_err());
    assert!("middle_n".parse::<MemoryRetrieval>().is_err());
}

#[test]
fn test_pgvector_settings_deserialize() {
    let settings = ivfflat_settings();
    assert_eq!(settings.distance(), Distance::L2);
    assert_eq!(settings.index().index_type(), IndexType::Ivfflat);
    if let VectorIndex::Ivfflat(index) = settings.index() {
        assert_eq!(index.lists_for(10_000), 100);
        assert_eq!(index.lists_for(4_000_000), 4_000);
    }
}

fn ivfflat_settings() -> PgVectorSettings {
    let json = serde_json::json!({
        "table_name": "recipes",
        "schema": "ai",
        "search_type": "vector",
        "index": {"type": "ivfflat"},
        "distance": "l2",
        "db_url": "postgresql+psycopg://ai:ai@localhost:5532/ai"
    });
    serde_json::from_value(json).unwrap()
}

#[test]
fn test_timestamp_formats() {
    let micros = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}Z$").unwrap();
    let seconds = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$").unwrap();
    assert!(micros.is_match(&current_utc_str()));
    assert!(seconds.is_match(&current_utc_seconds_str()));

    let first = current_utc_str();
    let second = current_utc_str();
    assert!(first <= second);
}

#[test]
fn test_pgvector_settings_deserialize_validates_names() {
    let empty_table = serde_json::json!({
        "table_name": "",
        "db_url": "postgresql+psycopg://ai:ai@localhost:5532/ai"
    });
    let err = serde_json::from_value::<PgVectorSettings>(empty_table).unwrap_err();
    assert!(err.to_string().contains("table name"));

    let empty_url = serde_json::json!({"table_name": "recipes", "db_url": " "});
    assert!(serde_json::from_value::<PgVectorSettings>(empty_url).is_err());

    let minimal: PgVectorSettings = serde_json::from_value(serde_json::json!({
        "table_name": "recipes",
        "db_url": "postgresql+psycopg://ai:ai@localhost:5532/ai"
    }))
    .unwrap();
    assert_eq!(minimal.qualified_table(), "ai.recipes");
    assert_eq!(minimal.index().index_type(), IndexType::Hnsw);
}
