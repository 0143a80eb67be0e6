use httptest::matchers::{all_of, request};
use httptest::responders::json_encoded;
use httptest::{Expectation, Server};
use serde_json::json;
use tempfile::tempdir;

use nearby_places::{NearbyApp, OpeningHours};

#[tokio::test]
async fn materializes_zones_from_both_sources_and_replays_from_cache() {
    let server = Server::run();

    // Open map database: two pharmacies around the rooftop.
    server.expect(
        Expectation::matching(all_of!(
            request::method("POST"),
            request::path("/interpreter")
        ))
        .respond_with(json_encoded(json!({
            "elements": [
                {
                    "type": "node",
                    "id": 101,
                    "lat": 41.3860,
                    "lon": 2.1734,
                    "tags": {
                        "name": "Farmàcia Prop",
                        "amenity": "pharmacy",
                        "addr:street": "Carrer de Pelai",
                        "addr:housenumber": "3"
                    }
                },
                {
                    "type": "node",
                    "id": 102,
                    "lat": 41.3900,
                    "lon": 2.1734,
                    "tags": {"name": "Farmàcia Llunyana", "amenity": "pharmacy"}
                }
            ]
        }))),
    );

    // Commercial provider: free-text restaurant search, provider-ranked.
    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path("/place/textsearch/json")
        ))
        .respond_with(json_encoded(json!({
            "status": "OK",
            "results": [
                {
                    "place_id": "g-rest-1",
                    "name": "Restaurant Estrella",
                    "formatted_address": "Av. Diagonal 600",
                    "geometry": {"location": {"lat": 41.3950, "lng": 2.1900}},
                    "rating": 4.8,
                    "price_level": 3,
                    "types": ["restaurant"],
                    "business_status": "OPERATIONAL",
                    "photos": [{"photo_reference": "photo-estrella"}]
                },
                {
                    "place_id": "g-rest-2",
                    "name": "Taverna del Barri",
                    "formatted_address": "Carrer de Pelai 12",
                    "geometry": {"location": {"lat": 41.3860, "lng": 2.1740}},
                    "rating": 4.4,
                    "types": ["restaurant"]
                }
            ]
        }))),
    );

    // Cross-source matching for the two pharmacies.
    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path("/place/findplacefromtext/json")
        ))
        .times(2)
        .respond_with(json_encoded(json!({
            "status": "OK",
            "candidates": [
                {
                    "place_id": "g-match",
                    "name": "Farmàcia Prop",
                    "formatted_address": "Carrer de Pelai 3",
                    "geometry": {"location": {"lat": 41.3860, "lng": 2.1734}}
                }
            ]
        }))),
    );

    // Detail fetches: two matched pharmacies plus two restaurants.
    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path("/place/details/json")
        ))
        .times(4)
        .respond_with(json_encoded(json!({
            "status": "OK",
            "result": {
                "formatted_phone_number": "+34 933 123 456",
                "website": "https://example.test/lloc",
                "opening_hours": {
                    "periods": [
                        {"open": {"day": 1, "time": "0900"}, "close": {"day": 1, "time": "2000"}}
                    ],
                    "weekday_text": ["lunes: 9:00–20:00"]
                },
                "rating": 4.6,
                "photos": [{"photo_reference": "photo-detail"}]
            }
        }))),
    );

    // Description batches: one request per category per materialization.
    server.expect(
        Expectation::matching(all_of!(
            request::method("POST"),
            request::path("/anthropic/v1/messages")
        ))
        .times(4)
        .respond_with(json_encoded(json!({
            "content": [{
                "type": "text",
                "text": "```json\n[\
                    {\"index\": 1, \"es\": \"Muy cerca de casa\", \"en\": \"Steps from home\", \"fr\": \"À deux pas\"},\
                    {\"index\": 2, \"es\": \"Opción del barrio\", \"en\": \"Neighborhood pick\", \"fr\": \"Choix du quartier\"}\
                ]\n```"
            }]
        }))),
    );

    std::env::set_var("OVERPASS_ENDPOINT", server.url("/interpreter").to_string());
    std::env::set_var("PLACES_ENDPOINT", server.url("/place").to_string());
    std::env::set_var("GOOGLE_PLACES_API_KEY", "test-places-key");
    std::env::set_var("ANTHROPIC_BASE_URL", server.url("/anthropic").to_string());
    std::env::set_var("ANTHROPIC_API_KEY", "test-anthropic-key");
    std::env::set_var("PLACES_RATE_LIMIT_QPS", "50");

    let dir = tempdir().unwrap();
    let app = NearbyApp::initialize(dir.path()).expect("initialize");
    assert!(app.public_config().has_google_places_key);
    assert!(app.public_config().has_anthropic_key);

    let selection = vec!["pharmacy".to_string(), "restaurant".to_string()];
    let first = app
        .generate_recommendations("prop-abcdef-123456", 41.3851, 2.1734, Some(&selection))
        .await
        .expect("first materialization");
    assert_eq!(first.zones_created, 2);
    assert_eq!(first.total_places, 4);

    // Same tile: every provider fetch replays from the cache.
    let second = app
        .generate_recommendations("prop-abcdef-123456", 41.3851, 2.1734, Some(&selection))
        .await
        .expect("second materialization");
    assert_eq!(second.zones_created, 0);
    assert_eq!(second.total_places, 4);

    let db = rusqlite::Connection::open(app.database_path()).expect("open db");

    let zone_count: i64 = db
        .query_row("SELECT COUNT(*) FROM zones", [], |row| row.get(0))
        .unwrap();
    assert_eq!(zone_count, 2);

    let recommendation_count: i64 = db
        .query_row("SELECT COUNT(*) FROM recommendations", [], |row| row.get(0))
        .unwrap();
    assert_eq!(recommendation_count, 4);

    let (qr_code, zone_order): (String, i64) = db
        .query_row(
            "SELECT qr_code, zone_order FROM zones WHERE category = 'pharmacy'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert!(qr_code.starts_with("REC-123456-pharmacy-"));
    assert_eq!(zone_order, 0);

    // Cross-source enrichment landed on the open-source place row.
    let (phone, hours_json): (String, String) = db
        .query_row(
            "SELECT phone, opening_hours FROM places WHERE osm_id = 'node/101'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(phone, "+34 933 123 456");
    let hours: OpeningHours = serde_json::from_str(&hours_json).unwrap();
    assert_eq!(hours.weekday_text, vec!["lunes: 9:00–20:00"]);

    // Provider ranking survives the cache replay: the farther restaurant stays first.
    let first_restaurant: String = db
        .query_row(
            "SELECT places.google_place_id
             FROM recommendations
             JOIN zones ON zones.id = recommendations.zone_id
             JOIN places ON places.id = recommendations.place_id
             WHERE zones.category = 'restaurant' AND recommendations.position = 0",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(first_restaurant, "g-rest-1");

    let described: i64 = db
        .query_row(
            "SELECT COUNT(*) FROM recommendations WHERE description LIKE '%\"fr\"%'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(described, 4);

    let sources: Vec<String> = {
        let mut statement = db
            .prepare(
                "SELECT DISTINCT recommendations.source
                 FROM recommendations
                 JOIN zones ON zones.id = recommendations.zone_id
                 ORDER BY recommendations.source",
            )
            .unwrap();
        let rows = statement.query_map([], |row| row.get(0)).unwrap();
        rows.map(Result::unwrap).collect()
    };
    assert_eq!(sources, vec!["AUTO_GOOGLE", "AUTO_OSM"]);

    // Read-only preview shares the cache and the enriched rows.
    let preview = app
        .fetch_nearby_places(41.3851, 2.1734, Some(&selection))
        .await;
    assert_eq!(preview.len(), 2);
    let pharmacy = preview
        .iter()
        .find(|category| category.category_id == "pharmacy")
        .unwrap();
    assert_eq!(pharmacy.places.len(), 2);
    assert_eq!(pharmacy.places[0].name, "Farmàcia Prop");
    assert_eq!(pharmacy.places[0].phone.as_deref(), Some("+34 933 123 456"));
    assert!(pharmacy.places[0].distance_meters <= pharmacy.places[1].distance_meters);
}
