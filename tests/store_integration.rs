use std::sync::Arc;

use pipeline::db::schema;
use pipeline::store::beer::{BeerUpsert, EnrichmentSource, EnrichmentStatus};
use pipeline::store::quota::QuotaScope;
use pipeline::store::Store;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

async fn setup_store() -> Store {
    sqlx::any::install_default_drivers();
    let name = Uuid::new_v4().to_string();
    let conn = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let pool = AnyPoolOptions::new().max_connections(5).connect(&conn).await.unwrap();
    schema::migrate(&pool).await.unwrap();
    Store::new(Arc::new(pool))
}

/// P3: once a beer carries a perplexity-sourced ABV, a subsequent taplist
/// re-ingest (upsert_beer) must leave abv/confidence/enrichment_source alone,
/// even though the new description also has an extractable ABV.
#[tokio::test]
async fn perplexity_sourced_abv_survives_reingest() {
    let store = setup_store().await;

    store
        .upsert_beer(&BeerUpsert {
            id: "beer-1".to_string(),
            brew_name: "Test IPA".to_string(),
            brewer: "Test Brewery".to_string(),
            brew_description: Some("An IPA".to_string()),
            description_hash: None,
            extracted_abv: None,
            extra: serde_json::json!({}),
        })
        .await
        .unwrap();

    store
        .update_enrichment(
            "beer-1",
            Some(6.5),
            Some(EnrichmentSource::Perplexity),
            Some(0.7),
            EnrichmentStatus::Enriched,
        )
        .await
        .unwrap();

    // A later taplist poll claims a different (wrong) ABV in the description.
    store
        .upsert_beer(&BeerUpsert {
            id: "beer-1".to_string(),
            brew_name: "Test IPA".to_string(),
            brewer: "Test Brewery".to_string(),
            brew_description: Some("An IPA with 9.9% ABV".to_string()),
            description_hash: None,
            extracted_abv: Some(9.9),
            extra: serde_json::json!({}),
        })
        .await
        .unwrap();

    let beer = store.get_beer("beer-1").await.unwrap().unwrap();
    assert_eq!(beer.abv, Some(6.5));
    assert_eq!(beer.confidence, Some(0.7));
    assert_eq!(beer.enrichment_source, Some(EnrichmentSource::Perplexity));
    // But the description/name fields still track the latest taplist poll.
    assert_eq!(beer.brew_description.as_deref(), Some("An IPA with 9.9% ABV"));
}

/// A fresh row with an extractable ABV gets the description-sourced defaults
/// (confidence 0.9, source `description`) from a single upsert call.
#[tokio::test]
async fn fresh_upsert_with_abv_gets_description_source_and_pending_status() {
    let store = setup_store().await;

    let beer = store
        .upsert_beer(&BeerUpsert {
            id: "beer-2".to_string(),
            brew_name: "Test Stout".to_string(),
            brewer: "Test Brewery".to_string(),
            brew_description: Some("A stout with 7.1% ABV".to_string()),
            description_hash: None,
            extracted_abv: Some(7.1),
            extra: serde_json::json!({}),
        })
        .await
        .unwrap();

    assert_eq!(beer.abv, Some(7.1));
    assert_eq!(beer.confidence, Some(0.9));
    assert_eq!(beer.enrichment_source, Some(EnrichmentSource::Description));
    assert_eq!(beer.enrichment_status, EnrichmentStatus::Pending);
}

/// P3: a perplexity-sourced ABV survives an arbitrary re-ingest, regardless
/// of what the new description's extractable ABV claims.
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn perplexity_abv_is_never_overwritten_by_reingest(
            perplexity_abv in 0.0..70.0f64,
            reingest_abv in prop::option::of(0.0..70.0f64),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let store = setup_store().await;

                store
                    .upsert_beer(&BeerUpsert {
                        id: "beer-prop".to_string(),
                        brew_name: "Test IPA".to_string(),
                        brewer: "Test Brewery".to_string(),
                        brew_description: Some("An IPA".to_string()),
                        description_hash: None,
                        extracted_abv: None,
                        extra: serde_json::json!({}),
                    })
                    .await
                    .unwrap();

                store
                    .update_enrichment(
                        "beer-prop",
                        Some(perplexity_abv),
                        Some(EnrichmentSource::Perplexity),
                        Some(0.7),
                        EnrichmentStatus::Enriched,
                    )
                    .await
                    .unwrap();

                store
                    .upsert_beer(&BeerUpsert {
                        id: "beer-prop".to_string(),
                        brew_name: "Test IPA".to_string(),
                        brewer: "Test Brewery".to_string(),
                        brew_description: Some("An IPA, reingested".to_string()),
                        description_hash: None,
                        extracted_abv: reingest_abv,
                        extra: serde_json::json!({}),
                    })
                    .await
                    .unwrap();

                let beer = store.get_beer("beer-prop").await.unwrap().unwrap();
                prop_assert_eq!(beer.abv, Some(perplexity_abv));
                prop_assert_eq!(beer.enrichment_source, Some(EnrichmentSource::Perplexity));
                Ok(())
            })?;
        }
    }
}

/// Quota reservations and beer writes share the same Store/pool without
/// cross-contaminating each other's tables.
#[tokio::test]
async fn quota_and_beer_tables_are_independent() {
    let store = setup_store().await;
    store
        .upsert_beer(&BeerUpsert {
            id: "beer-3".to_string(),
            brew_name: "Test Lager".to_string(),
            brewer: "Test Brewery".to_string(),
            brew_description: None,
            description_hash: None,
            extracted_abv: None,
            extra: serde_json::json!({}),
        })
        .await
        .unwrap();

    let reservation = store.reserve_batch(QuotaScope::Enrichment, 3, 10).await.unwrap();
    assert_eq!(reservation.reserved, 3);

    let beer = store.get_beer("beer-3").await.unwrap().unwrap();
    assert_eq!(beer.enrichment_status, EnrichmentStatus::Pending);
}
