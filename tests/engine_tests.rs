mod common;

use common::{
    capabilities_xml, engine, engine_with_catalog, feature_collection, png_bytes, raster_record, street_image,
    vector_record, ScriptedFetcher,
};
use layerkit::layers::street::street_images_id;
use layerkit::prelude::*;

fn project(id: &str) -> ProjectLayerSet {
    let mut set = ProjectLayerSet::new(id);
    set.raster_layers.push(raster_record(1, "ws:ortho", 2000));
    set.vector_layers.push(vector_record(2, "ws:roads"));
    set
}

fn street_project(id: &str) -> ProjectLayerSet {
    let mut set = project(id);
    set.street_images = vec![street_image(11, 12.9716, 77.5946), street_image(12, 12.9720, 77.5950)];
    set
}

fn scripted_services() -> Arc<ScriptedFetcher> {
    let fetcher = ScriptedFetcher::new();
    fetcher.route("rasters/wms GetCapabilities", FetchResponse::ok(capabilities_xml(&["ws:Ortho_2021"])));
    fetcher.route("vectors/wms GetCapabilities", FetchResponse::ok(capabilities_xml(&["ws:roads"])));
    fetcher.route("rasters/wms GetFeatureInfo", FetchResponse::ok(feature_collection(&["r1"])));
    fetcher.route("vectors/wms GetFeatureInfo", FetchResponse::ok(feature_collection(&["v1", "v2"])));
    fetcher.route("cdn.test/images/", FetchResponse::ok(png_bytes()));
    fetcher
}

fn ids(handles: &[LayerHandle]) -> Vec<String> {
    handles.iter().map(|handle| handle.id().to_string()).collect()
}

#[tokio::test]
async fn test_load_builds_layers_in_render_order() {
    let engine = engine(scripted_services());
    let handles = engine.load_project_layers(street_project("p1"));

    assert_eq!(
        ids(&handles),
        vec!["raster_1", "vector_2", "street_images_p1", "street_connections_p1"]
    );
    let all = ids(&engine.effective_layer_set("p1"));
    assert_eq!(&all[..3], &["osm", "satellite", "terrain"]);
    assert_eq!(all.len(), 7);
    assert_eq!(ids(&engine.effective_layer_set("p2")), vec!["osm", "satellite", "terrain"]);

    // Category defaults: vectors shown, everything else hidden.
    assert!(!engine.layer("raster_1").unwrap().is_visible());
    assert!(engine.layer("vector_2").unwrap().is_visible());
    assert!(!engine.layer("street_images_p1").unwrap().is_visible());
    assert!(engine.layer("satellite").unwrap().is_visible());
}

#[tokio::test]
async fn test_raster_representation_follows_size() {
    let engine = engine(scripted_services());
    let mut set = ProjectLayerSet::new("p1");
    set.raster_layers.push(raster_record(1, "ws:big", 6000));
    set.raster_layers.push(raster_record(2, "ws:small", 2000));
    engine.load_project_layers(set);

    assert!(engine.layer("raster_1").unwrap().with_source(LayerSource::is_tiled));
    assert!(matches!(
        engine.layer("raster_2").unwrap().source(),
        LayerSource::ImageWms { .. }
    ));
}

#[tokio::test]
async fn test_validation_corrects_names_in_place() {
    let fetcher = scripted_services();
    let engine = engine(fetcher.clone());
    let raster = engine.load_project_layers(project("p1")).remove(0);
    let revision = raster.revision();

    let results = engine.validate_layers().await;

    assert_eq!(results.len(), 2);
    assert_eq!(raster.layer_name().as_deref(), Some("ws:Ortho_2021"));
    assert!(raster.revision() > revision);
    assert_eq!(engine.layer("vector_2").unwrap().layer_name().as_deref(), Some("ws:roads"));
    assert_eq!(fetcher.count("GetCapabilities"), 2);

    let stats = engine.cache_stats();
    assert_eq!(stats.capabilities.size, 2);
    assert_eq!(stats.validations.size, 2);
    engine.clear_caches();
    assert_eq!(engine.cache_stats().capabilities.size, 0);
}

#[tokio::test]
async fn test_unknown_layer_keeps_name_and_reports_after_failing() {
    let fetcher = ScriptedFetcher::new();
    fetcher.route("GetCapabilities", FetchResponse::ok(capabilities_xml(&[])));
    let engine = engine(fetcher);
    engine.load_project_layers(project("p1"));
    engine.validate_layers().await;

    let vector = engine.layer("vector_2").unwrap();
    assert_eq!(vector.layer_name().as_deref(), Some("ws:roads"));
    assert_eq!(vector.diagnostic(), None);

    engine.report_load_event("vector_2", LoadEvent::Failed);
    engine.report_load_event("vector_2", LoadEvent::Failed);
    engine.process_load_events();

    assert_eq!(vector.status(), LoadingStatus::Error);
    assert_eq!(
        vector.diagnostic().as_deref(),
        Some("Layer 'ws:roads' not found. Available layers: none found")
    );
}

#[tokio::test]
async fn test_load_events_retry_once_with_fallback() {
    let engine = engine(scripted_services());
    engine.load_project_layers(project("p1"));
    let raster = engine.layer("raster_1").unwrap();

    let sender = engine.load_event_sender();
    let t0 = Instant::now();
    for event in [LoadEvent::Start, LoadEvent::Failed, LoadEvent::Start, LoadEvent::Failed, LoadEvent::Failed] {
        sender
            .send(LayerLoadEvent {
                layer_id: "raster_1".to_string(),
                event,
                at: t0,
            })
            .unwrap();
    }
    engine.report_load_event("vector_2", LoadEvent::Start);
    engine.report_load_event("vector_2", LoadEvent::Loaded);
    engine.report_load_event("raster_99", LoadEvent::Failed);

    let applied = engine.process_load_events();

    assert_eq!(applied.len(), 7);
    assert_eq!(applied.iter().filter(|(_, t)| t.apply_fallback).count(), 1);
    assert_eq!(raster.status(), LoadingStatus::Error);
    assert_eq!(raster.params().unwrap().version(), "1.1.1");
    assert_eq!(engine.layer("vector_2").unwrap().status(), LoadingStatus::Loaded);

    let metrics = engine.load_metrics();
    assert_eq!(metrics.retried, 1);
    assert_eq!(metrics.failed, 1);
    assert_eq!(metrics.loaded, 1);
    assert!(metrics.load_times.contains_key("vector_2"));
    assert!(metrics.average_load_time().is_some());
}

#[tokio::test]
async fn test_click_combines_raster_then_vector() {
    let engine = engine(scripted_services());
    engine.load_project_layers(project("p1"));
    engine.set_visibility("raster_1", true, false);

    let results = engine
        .on_map_click(Point::new(8_637_000.0, 1_456_000.0), &ViewState::new(2.0))
        .await;

    let layers: Vec<&str> = results.iter().map(|r| r.layer_id.as_str()).collect();
    assert_eq!(layers, vec!["raster_1", "vector_2", "vector_2"]);
    assert_eq!(results[0].kind, LayerKind::Raster);
    assert_eq!(results[1].feature.property("name"), Some(&serde_json::json!("v1")));
}

#[tokio::test(start_paused = true)]
async fn test_click_survives_a_hanging_layer() {
    let fetcher = ScriptedFetcher::new();
    fetcher.hang("rasters/wms GetFeatureInfo");
    fetcher.route("vectors/wms GetFeatureInfo", FetchResponse::ok(feature_collection(&["v1"])));
    let engine = engine(fetcher);
    engine.load_project_layers(project("p1"));
    engine.set_visibility("raster_1", true, false);

    let started = tokio::time::Instant::now();
    let results = engine.on_map_click(Point::new(0.0, 0.0), &ViewState::new(1.0)).await;

    assert!(started.elapsed() <= Duration::from_secs(1));
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].layer_id, "vector_2");
}

#[tokio::test]
async fn test_click_hit_tests_street_images_locally() {
    let fetcher = scripted_services();
    let engine = engine(fetcher.clone());
    engine.load_project_layers(street_project("p1"));
    engine.enter_street_view();
    engine.set_visibility("vector_2", false, true);

    let point = LatLng::new(12.9716, 77.5946).to_mercator();
    let results = engine.on_map_click(point, &ViewState::new(1.0)).await;

    assert!(!results.is_empty());
    assert_eq!(results[0].layer_id, street_images_id("p1"));
    assert_eq!(results[0].feature.property("name"), Some(&serde_json::json!("IMG_0011.jpg")));
    assert_eq!(fetcher.count("GetFeatureInfo"), 0);

    let far = engine.on_map_click(Point::new(0.0, 0.0), &ViewState::new(1.0)).await;
    assert!(far.is_empty());
}

#[tokio::test]
async fn test_temporary_override_wins_until_cleared() {
    let engine = engine(scripted_services());
    engine.load_project_layers(project("p1"));

    engine.set_visibility("raster_1", true, false);
    engine.set_visibility("raster_1", false, true);
    assert!(!engine.effective_visibility("raster_1"));
    assert!(!engine.layer("raster_1").unwrap().is_visible());

    engine.exit_street_view();
    assert!(engine.effective_visibility("raster_1"));
    assert!(engine.layer("raster_1").unwrap().is_visible());
}

#[tokio::test]
async fn test_reloading_keeps_caller_choices() {
    let engine = engine(scripted_services());
    engine.load_project_layers(project("p1"));
    engine.set_visibility("vector_2", false, false);

    engine.load_project_layers(project("p1"));

    assert!(!engine.effective_visibility("vector_2"));
    assert!(!engine.layer("vector_2").unwrap().is_visible());
}

#[tokio::test]
async fn test_switching_projects_clears_only_temporary_overrides() {
    let engine = engine_with_catalog(scripted_services(), vec![project("p1"), street_project("p2")]);

    engine.activate_project("p1").await;
    engine.set_visibility("vector_2", false, false);
    engine.set_visibility("raster_1", true, true);
    assert!(engine.effective_visibility("raster_1"));

    let handles = engine.activate_project("p2").await;

    assert_eq!(engine.active_project().as_deref(), Some("p2"));
    assert_eq!(handles.len(), 4);
    assert!(!engine.effective_visibility("raster_1"));
    assert!(!engine.effective_visibility("vector_2"));
    assert!(engine.layer("street_images_p1").is_none());
}

#[tokio::test]
async fn test_street_view_shows_street_layers_temporarily() {
    let engine = engine(scripted_services());
    engine.load_project_layers(street_project("p1"));

    engine.enter_street_view();
    assert!(engine.layer("street_images_p1").unwrap().is_visible());
    assert!(engine.layer("street_connections_p1").unwrap().is_visible());

    engine.exit_street_view();
    assert!(!engine.layer("street_images_p1").unwrap().is_visible());
}

#[tokio::test]
async fn test_exactly_one_base_layer_visible() {
    let engine = engine(scripted_services());

    assert!(engine.switch_base_layer("osm"));
    assert_eq!(engine.active_base_layer(), "osm");
    assert!(!engine.switch_base_layer("watercolor"));

    engine.set_visibility("terrain", true, false);
    let visible: Vec<String> = engine
        .effective_layer_set("none")
        .into_iter()
        .filter(|handle| handle.is_visible())
        .map(|handle| handle.id().to_string())
        .collect();
    assert_eq!(visible, vec!["terrain"]);
}

#[tokio::test]
async fn test_active_base_layer_cannot_be_hidden() {
    let engine = engine(scripted_services());
    assert!(engine.switch_base_layer("satellite"));

    engine.set_visibility("satellite", false, false);
    engine.set_visibility("satellite", false, true);

    let visible_bases: Vec<String> = engine
        .effective_layer_set("none")
        .into_iter()
        .filter(|handle| handle.is_visible())
        .map(|handle| handle.id().to_string())
        .collect();
    assert_eq!(visible_bases, vec!["satellite"]);
    assert_eq!(engine.active_base_layer(), "satellite");
    assert!(engine.effective_visibility("satellite"));
}

#[tokio::test]
async fn test_thumbnail_starts_pending_then_renders() {
    let fetcher = scripted_services();
    let engine = engine(fetcher.clone());
    engine.load_project_layers(street_project("p1"));

    assert_eq!(engine.get_thumbnail("11"), ThumbnailState::Pending);
    assert_eq!(engine.get_thumbnail("404"), ThumbnailState::Missing);

    let thumbnail = engine.thumbnail("11").await.unwrap();
    assert!(!thumbnail.is_fallback());
    assert!(matches!(engine.get_thumbnail("11"), ThumbnailState::Ready(_)));
    assert!(matches!(
        engine.street_image_style("11", 10.0),
        Some(PointStyle::Thumbnail { label: Some(_), .. })
    ));
    assert!(matches!(
        engine.street_image_style("11", 50.0),
        Some(PointStyle::Thumbnail { label: None, .. })
    ));
    assert_eq!(fetcher.count("/images/11.jpg"), 1);
}

#[tokio::test]
async fn test_preload_and_retry_failed_thumbnails() {
    let fetcher = ScriptedFetcher::new();
    fetcher.route("/images/11.jpg", FetchResponse::with_status(500, "boom"));
    fetcher.route("cdn.test/images/", FetchResponse::ok(png_bytes()));
    let engine = engine(fetcher.clone());
    engine.load_project_layers(street_project("p1"));

    let outcome = engine.preload_thumbnails().await;
    assert_eq!(outcome.rendered + outcome.fallbacks, outcome.requested);
    assert_eq!(engine.cache_stats().thumbnails.cached, 2);
    assert_eq!(engine.cache_stats().thumbnails.failed, 1);

    assert_eq!(engine.retry_failed_thumbnails(), 1);
    assert_eq!(engine.get_thumbnail("11"), ThumbnailState::Pending);
}

#[test]
fn test_builder_rejects_invalid_options() {
    let mut options = EngineProfile::Testing.resolve();
    options.preload.batch_size = 0;
    let result = EngineBuilder::new()
        .with_options(options)
        .with_fetcher(ScriptedFetcher::new())
        .build();
    assert!(matches!(result, Err(EngineError::Config(_))));
}
