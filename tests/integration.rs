use std::collections::BTreeSet;

use geo::{Area, Coord, LineString, Polygon};
use textline_merge::{
    can_merge, cluster,
    tref::{decode_coordinates, encode_coordinates},
    Direction, ErrorPolicy, MergeError, MergeParams, MergeRequest, ParamOverrides, Quadrilateral,
    Rgb, TextRegion, TextRegionExchange, TextlineMergerBuilder, VERSION,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn entry(line: &Quadrilateral) -> TextRegionExchange {
    line.to_exchange(WIDTH, HEIGHT).unwrap()
}

fn labelled(x: f32, y: f32, w: f32, h: f32, label: &str) -> Quadrilateral {
    Quadrilateral::from_rect(x, y, w, h).with_text(label)
}

fn partition(regions: &[TextRegion]) -> BTreeSet<BTreeSet<String>> {
    regions
        .iter()
        .map(|region| region.lines().iter().map(|it| it.text.clone()).collect())
        .collect()
}

fn texts(region: &TextRegion) -> Vec<&str> {
    region.lines().iter().map(|it| it.text.as_str()).collect()
}

#[test]
fn chained_lines_form_one_region() {
    init_logging();
    let a = labelled(0.0, 0.0, 100.0, 10.0, "a");
    let b = labelled(0.0, 12.0, 100.0, 10.0, "b");
    let c = labelled(0.0, 24.0, 100.0, 10.0, "c");
    let params = MergeParams::default();

    assert!(can_merge(&a, &b, &params).unwrap());
    assert!(can_merge(&b, &c, &params).unwrap());
    assert!(!can_merge(&a, &c, &params).unwrap());

    let regions = cluster(vec![c, a, b], &params).unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(texts(&regions[0]), vec!["a", "b", "c"]);
    assert_eq!(regions[0].direction(), Direction::Horizontal);
}

#[test]
fn isolated_lines_stay_single() {
    init_logging();
    let lines = vec![
        labelled(0.0, 0.0, 60.0, 10.0, "a"),
        labelled(300.0, 0.0, 60.0, 10.0, "b"),
        labelled(0.0, 300.0, 10.0, 60.0, "c"),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(regions.len(), 3);
    assert!(regions.iter().all(|it| it.len() == 1));
    let order = regions.iter().map(|it| it.lines()[0].text.as_str()).collect::<Vec<_>>();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn empty_input_yields_no_regions() {
    let merger = TextlineMergerBuilder::new().build();
    let outcome = merger.merge(Vec::new()).unwrap();

    assert!(outcome.regions.is_empty());
    assert!(outcome.skipped.is_empty());
}

#[test]
fn clustering_merged_members_again_gives_the_same_partition() {
    init_logging();
    let lines = vec![
        labelled(0.0, 0.0, 100.0, 10.0, "p1"),
        labelled(0.0, 12.0, 90.0, 10.0, "p2"),
        labelled(0.0, 24.0, 95.0, 10.0, "p3"),
        labelled(200.0, 0.0, 10.0, 100.0, "v1"),
        labelled(212.0, 0.0, 10.0, 80.0, "v2"),
        labelled(400.0, 400.0, 50.0, 12.0, "lonely"),
    ];
    let params = MergeParams::default();
    let first = cluster(lines, &params).unwrap();

    let flattened = first
        .iter()
        .rev()
        .flat_map(|it| it.lines().iter().cloned())
        .collect::<Vec<_>>();
    let second = cluster(flattened, &params).unwrap();
    assert_eq!(partition(&first), partition(&second));
    assert_eq!(first.len(), 3);

    for region in &first {
        let again = cluster(region.lines().to_vec(), &params).unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(texts(&again[0]), texts(region));
    }
}

#[test]
fn vertical_columns_are_ordered_left_to_right() {
    let lines = vec![
        labelled(24.0, 0.0, 10.0, 90.0, "right"),
        labelled(0.0, 0.0, 10.0, 100.0, "left"),
        labelled(12.0, 0.0, 10.0, 80.0, "middle"),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].direction(), Direction::Vertical);
    assert_eq!(texts(&regions[0]), vec!["left", "middle", "right"]);
}

#[test]
fn fragments_of_one_row_read_left_to_right() {
    let lines = vec![
        labelled(12.0, 0.0, 10.0, 10.0, "right"),
        labelled(0.0, 0.5, 10.0, 10.0, "left"),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].direction(), Direction::Horizontal);
    assert_eq!(texts(&regions[0]), vec!["left", "right"]);
}

#[test]
fn fragments_of_one_column_read_top_to_bottom() {
    let lines = vec![
        labelled(0.0, 42.0, 10.0, 40.0, "bottom"),
        labelled(0.5, 0.0, 10.0, 40.0, "top"),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].direction(), Direction::Vertical);
    assert_eq!(texts(&regions[0]), vec!["top", "bottom"]);
}

#[test]
fn jittered_paragraph_reads_row_by_row() {
    init_logging();
    let lines = vec![
        labelled(42.0, 12.5, 40.0, 10.0, "2b"),
        labelled(42.0, 0.0, 40.0, 10.0, "1b"),
        labelled(0.3, 12.0, 40.0, 10.0, "2a"),
        labelled(0.0, 24.0, 40.0, 10.0, "3a"),
        labelled(0.0, 0.4, 40.0, 10.0, "1a"),
        labelled(41.5, 24.3, 40.0, 10.0, "3b"),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].direction(), Direction::Horizontal);
    assert_eq!(texts(&regions[0]), vec!["1a", "1b", "2a", "2b", "3a", "3b"]);
}

#[test]
fn jittered_columns_read_column_by_column() {
    let lines = vec![
        labelled(12.4, 42.0, 10.0, 40.0, "2b"),
        labelled(0.0, 42.3, 10.0, 40.0, "1b"),
        labelled(12.0, 0.0, 10.0, 40.0, "2a"),
        labelled(0.6, 0.0, 10.0, 40.0, "1a"),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].direction(), Direction::Vertical);
    assert_eq!(texts(&regions[0]), vec!["1a", "1b", "2a", "2b"]);
}

#[test]
fn unknown_direction_hint_does_not_fail_the_request() {
    let mut entries = vec![
        entry(&labelled(0.0, 0.0, 60.0, 10.0, "a")),
        entry(&labelled(62.0, 0.0, 60.0, 10.0, "b")),
    ];
    entries[0].direction = Some(Direction::Vertical);
    let mut json = serde_json::to_value(MergeRequest {
        width: WIDTH,
        height: HEIGHT,
        textlines: entries,
        overrides: ParamOverrides::default(),
    })
    .unwrap();
    json["textlines"][0]["direction"] = serde_json::json!("w");

    let request: MergeRequest = serde_json::from_value(json).unwrap();
    let response = TextlineMergerBuilder::new()
        .build()
        .merge_request(&request)
        .unwrap();

    assert_eq!(response.regions.len(), 1);
    assert_eq!(response.regions[0].direction, Some(Direction::Horizontal));
    assert!(response.skipped.is_empty());
}

#[test]
fn direction_tie_falls_back_to_region_shape() {
    let lines = vec![
        Quadrilateral::from_rect(0.0, 0.0, 100.0, 10.0).with_direction(Some(Direction::Vertical)),
        Quadrilateral::from_rect(0.0, 12.0, 100.0, 10.0),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].direction(), Direction::Horizontal);
}

#[test]
fn region_colors_come_from_the_most_confident_line() {
    let lines = vec![
        Quadrilateral::from_rect(0.0, 0.0, 100.0, 10.0)
            .with_confidence(0.4)
            .with_colors(Rgb([10, 10, 10]), Rgb([200, 200, 200])),
        Quadrilateral::from_rect(0.0, 12.0, 100.0, 10.0)
            .with_confidence(0.9)
            .with_colors(Rgb([50, 60, 70]), Rgb::UNSET),
        Quadrilateral::from_rect(0.0, 24.0, 100.0, 10.0).with_confidence(0.95),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].foreground(), Rgb([50, 60, 70]));
    assert_eq!(regions[0].background(), Rgb([200, 200, 200]));
}

#[test]
fn axis_aligned_region_uses_the_bounding_box() {
    let lines = vec![
        Quadrilateral::from_rect(10.0, 20.0, 100.0, 10.0),
        Quadrilateral::from_rect(10.0, 32.0, 80.0, 10.0),
    ];

    let regions = cluster(lines, &MergeParams::default()).unwrap();

    assert_eq!(
        regions[0].bounds(),
        &[
            Coord { x: 10.0, y: 20.0 },
            Coord { x: 110.0, y: 20.0 },
            Coord { x: 110.0, y: 42.0 },
            Coord { x: 10.0, y: 42.0 },
        ]
    );
}

#[test]
fn rotated_region_keeps_its_rotation() {
    let rotated = |y: f32| {
        let (sin, cos) = 30f32.to_radians().sin_cos();
        let corners = [(100.0, y), (200.0, y), (200.0, y + 20.0), (100.0, y + 20.0)]
            .map(|(x, y)| (x * cos - y * sin + 200.0, x * sin + y * cos));
        Quadrilateral::from_points(&corners).unwrap()
    };
    let lines = vec![rotated(0.0), rotated(24.0)];

    let regions = cluster(lines, &MergeParams::default()).unwrap();
    assert_eq!(regions.len(), 1);

    let bounds = regions[0].bounds();
    let area = Polygon::new(LineString::from(bounds.to_vec()), vec![]).unsigned_area();
    // two 100x20 lines with a 4px gap
    assert!((area - 4400.0).abs() < 1.0, "area {area}");
    let top_left = bounds[0];
    assert!(bounds.iter().all(|it| it.x + it.y >= top_left.x + top_left.y));
}

#[test]
fn request_round_trip_through_json() {
    init_logging();
    let lines = [
        Quadrilateral::from_rect(20.0, 30.0, 200.0, 20.0)
            .with_text("first")
            .with_confidence(0.8)
            .with_colors(Rgb([1, 2, 3]), Rgb::UNSET),
        Quadrilateral::from_rect(20.0, 54.0, 180.0, 20.0).with_text("second"),
        Quadrilateral::from_rect(400.0, 300.0, 20.0, 120.0).with_text("column"),
    ];
    let request = serde_json::json!({
        "width": WIDTH,
        "height": HEIGHT,
        "textlines": lines.iter().map(entry).collect::<Vec<_>>(),
    });
    let request: MergeRequest = serde_json::from_value(request).unwrap();

    let response = TextlineMergerBuilder::new()
        .build()
        .merge_request(&request)
        .unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["version"], VERSION);
    assert!(json.get("skipped").is_none());
    let regions = json["regions"].as_array().unwrap();
    assert_eq!(regions.len(), 2);

    let paragraph = regions[0].as_object().unwrap();
    assert_eq!(paragraph["fmt"], "quad");
    assert_eq!(paragraph["direction"], "h");
    assert_eq!(paragraph["fg"], serde_json::json!([1, 2, 3]));
    assert!(!paragraph.contains_key("text"));
    assert!(!paragraph.contains_key("prob"));
    let members = paragraph["lines"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0]["text"], "first");
    assert_eq!(members[0]["prob"].as_f64().unwrap() as f32, 0.8);
    assert_eq!(members[1]["text"], "second");
    assert_eq!(members[1]["lines"], serde_json::json!([]));

    let bounds = decode_coordinates(&response.regions[0].coordinates, WIDTH, HEIGHT).unwrap();
    let expected = [(20.0, 30.0), (220.0, 30.0), (220.0, 74.0), (20.0, 74.0)];
    for (point, (x, y)) in bounds.iter().zip(expected) {
        assert!((point.x - x).abs() < 1e-3 && (point.y - y).abs() < 1e-3);
    }

    assert_eq!(regions[1]["direction"], "v");
    assert_eq!(regions[1]["lines"].as_array().unwrap().len(), 1);
}

#[test]
fn request_overrides_change_the_outcome() {
    let lines = [
        Quadrilateral::from_rect(0.0, 0.0, 10.0, 10.0),
        Quadrilateral::from_rect(12.0, 0.0, 10.0, 10.0),
    ];
    let merger = TextlineMergerBuilder::new().build();
    let entries = lines.iter().map(entry).collect::<Vec<_>>();

    let merged = merger
        .merge_exchange(&entries, WIDTH, HEIGHT, &ParamOverrides::default())
        .unwrap();
    assert_eq!(merged.regions.len(), 1);

    let strict_gap = ParamOverrides {
        gap_limit: Some(0.1),
        ..ParamOverrides::default()
    };
    let split = merger
        .merge_exchange(&entries, WIDTH, HEIGHT, &strict_gap)
        .unwrap();
    assert_eq!(split.regions.len(), 2);
}

fn broken_entries() -> Vec<TextRegionExchange> {
    let good = Quadrilateral::from_rect(10.0, 10.0, 100.0, 12.0).with_text("good");
    let also_good = Quadrilateral::from_rect(10.0, 24.0, 100.0, 12.0).with_text("also good");
    let degenerate =
        Quadrilateral::from_points(&[(300.0, 10.0), (300.0, 10.0), (320.0, 30.0), (300.0, 30.0)])
            .unwrap();

    let mut textbox = entry(&good);
    textbox.format = "textbox".to_string();
    let mut garbled = entry(&good);
    garbled.coordinates = "%%%".to_string();

    vec![
        entry(&good),
        textbox,
        entry(&degenerate),
        garbled,
        entry(&also_good),
    ]
}

#[test]
fn strict_policy_rejects_the_whole_request() {
    let merger = TextlineMergerBuilder::new()
        .policy(ErrorPolicy::Strict)
        .build();

    let err = merger
        .merge_exchange(&broken_entries(), WIDTH, HEIGHT, &ParamOverrides::default())
        .unwrap_err();
    assert_eq!(err, MergeError::UnsupportedFormat("textbox".to_string()));

    let entries = broken_entries();
    let good_and_degenerate = [entries[0].clone(), entries[2].clone()];
    let err = merger
        .merge_exchange(
            &good_and_degenerate,
            WIDTH,
            HEIGHT,
            &ParamOverrides::default(),
        )
        .unwrap_err();
    assert!(matches!(err, MergeError::DegenerateGeometry(_)));
}

#[test]
fn lenient_policy_skips_and_reports_bad_lines() {
    init_logging();
    let merger = TextlineMergerBuilder::new().lenient(true).build();

    let outcome = merger
        .merge_exchange(&broken_entries(), WIDTH, HEIGHT, &ParamOverrides::default())
        .unwrap();

    let skipped = outcome.skipped.iter().map(|it| it.index).collect::<Vec<_>>();
    assert_eq!(skipped, vec![1, 2, 3]);
    assert!(outcome.skipped[0].reason.contains("textbox"));
    assert_eq!(outcome.regions.len(), 1);
    assert_eq!(texts(&outcome.regions[0]), vec!["good", "also good"]);
}

#[test]
fn invalid_dimensions_fail_even_when_lenient() {
    let merger = TextlineMergerBuilder::new().lenient(true).build();

    let err = merger
        .merge_exchange(&broken_entries(), 1, HEIGHT, &ParamOverrides::default())
        .unwrap_err();
    assert_eq!(
        err,
        MergeError::InvalidDimensions {
            width: 1,
            height: HEIGHT
        }
    );
}

#[test]
fn clipping_pulls_lines_into_the_image() {
    let points = [
        Coord { x: -20.0, y: 5.0 },
        Coord { x: 80.0, y: 5.0 },
        Coord { x: 80.0, y: 17.0 },
        Coord { x: -20.0, y: 17.0 },
    ];
    let raw = TextRegionExchange {
        format: "quad".to_string(),
        coordinates: encode_coordinates(&points, WIDTH, HEIGHT).unwrap(),
        foreground: None,
        background: None,
        text: None,
        confidence: None,
        direction: None,
        lines: Vec::new(),
    };

    let outcome = TextlineMergerBuilder::new()
        .clip(true)
        .build()
        .merge_exchange(&[raw], WIDTH, HEIGHT, &ParamOverrides::default())
        .unwrap();

    let line = &outcome.regions[0].lines()[0];
    assert_eq!(line.points()[0], Coord { x: 0.0, y: 5.0 });
    assert!(line.points().iter().all(|it| it.x >= 0.0));
}
