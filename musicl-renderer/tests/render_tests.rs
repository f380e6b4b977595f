use chrono::{TimeZone, Utc};
use musicl_core::types::{ChannelMeta, Enclosure, Episode, PlaylistFormat, Pointer, RemoteItem};
use musicl_detector::{detect_format, inspect};
use musicl_reconcile::{extract_existing, ReconciliationResult};
use musicl_renderer::{RenderError, Renderer};
use rstest::rstest;
use tempfile::TempDir;

fn meta() -> ChannelMeta {
    ChannelMeta {
        title: "Music Monday & Friends".into(),
        description: "Every track <played> on the show".into(),
        author: "ChadF".into(),
        link: "https://example.com/show".into(),
        source_url: "https://example.com/show.xml".into(),
        image_url: "https://example.com/art.png".into(),
        guid: "1b4c1d6a-9a3f-5d35-9a0a-0c8c6a3b7e01".into(),
        language: "en".into(),
        pub_date: Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap(),
        last_build_date: Utc.with_ymd_and_hms(2025, 1, 7, 12, 30, 0).unwrap(),
    }
}

fn result() -> ReconciliationResult {
    let kept = RemoteItem {
        feed_guid: "legacy".into(),
        item_guid: "y".into(),
        raw_form: r#"<podcast:remoteItem itemGuid='y'  feedGuid='legacy' />"#.into(),
    };
    ReconciliationResult {
        items: vec![kept, RemoteItem::synthesize(&Pointer::new("up", "z"))],
        added: 1,
        carried_over: 1,
        orphaned: 0,
    }
}

fn episodes() -> Vec<Episode> {
    vec![
        Episode {
            key: "ep-2".into(),
            title: "Episode 2: ]]> edge".into(),
            link: Some("https://example.com/ep2".into()),
            published_at: Some(Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap()),
            description: "<b>bold</b> notes".into(),
            enclosure: Some(Enclosure {
                url: "https://example.com/ep2.mp3?a=1&b=2".into(),
                mime_type: None,
                length: Some(1234),
            }),
            pointers: vec![Pointer::new("up", "t-1")],
        },
        Episode {
            key: "ep-1".into(),
            title: "Episode 1".into(),
            link: None,
            published_at: None,
            description: String::new(),
            enclosure: None,
            pointers: vec![],
        },
    ]
}

#[test]
fn remote_items_are_emitted_verbatim_in_order() {
    let doc = Renderer::new()
        .unwrap()
        .render(PlaylistFormat::RemoteItemsOnly, &meta(), &result(), &[])
        .unwrap();

    let y = doc.find("itemGuid='y'").expect("carried item");
    let z = doc.find(r#"itemGuid="z""#).expect("new item");
    assert!(y < z);
    assert!(doc.contains(r#"<podcast:remoteItem itemGuid='y'  feedGuid='legacy' />"#));
    assert!(doc.contains("<title>Music Monday &amp; Friends</title>"));
    assert!(doc.contains("<pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>"));
    assert!(doc.contains("<lastBuildDate>Tue, 07 Jan 2025 12:30:00 GMT</lastBuildDate>"));
    assert!(doc.contains("<podcast:medium>musicL</podcast:medium>"));
    assert!(!doc.contains('\r'));
}

#[test]
fn rendered_pointers_extract_back_unchanged() {
    let doc = Renderer::new()
        .unwrap()
        .render(PlaylistFormat::RemoteItemsOnly, &meta(), &result(), &[])
        .unwrap();
    let existing = extract_existing(&doc);
    let back: Vec<_> = existing.iter().cloned().collect();
    assert_eq!(back, result().items);
}

#[test]
fn header_is_readable_by_inspect() {
    let doc = Renderer::new()
        .unwrap()
        .render(PlaylistFormat::RemoteItemsOnly, &meta(), &result(), &[])
        .unwrap();
    let summary = inspect(&doc);
    assert_eq!(summary.title.as_deref(), Some("Music Monday & Friends"));
    assert_eq!(summary.guid.as_deref(), Some(meta().guid.as_str()));
    assert_eq!(summary.source_feed.as_deref(), Some("https://example.com/show.xml"));
    assert_eq!(summary.image_url.as_deref(), Some("https://example.com/art.png"));
    assert_eq!(summary.author.as_deref(), Some("ChadF"));
    assert_eq!(summary.remote_item_count, 2);
    assert_eq!(summary.last_build_time(), Some(meta().last_build_date));
}

#[test]
fn full_items_render_one_entry_per_episode() {
    let doc = Renderer::new()
        .unwrap()
        .render(PlaylistFormat::FullItems, &meta(), &result(), &episodes())
        .unwrap();

    assert_eq!(doc.matches("<item>").count(), 2);
    assert!(doc.contains("<title><![CDATA[Episode 2: ]]]]><![CDATA[> edge]]></title>"));
    assert!(doc.contains(r#"<guid isPermaLink="false">ep-2</guid>"#));
    assert!(doc.contains(
        r#"<enclosure url="https://example.com/ep2.mp3?a=1&amp;b=2" type="audio/mpeg" length="1234"/>"#
    ));
    assert!(doc.contains(r#"<podcast:remoteItem feedGuid="up" itemGuid="t-1"/>"#));
    assert!(!doc.contains(r#"itemGuid="z""#), "pointer merge is not used for full items");
}

#[rstest]
#[case(PlaylistFormat::RemoteItemsOnly)]
#[case(PlaylistFormat::FullItems)]
fn rendered_format_is_detected_back(#[case] format: PlaylistFormat) {
    let doc = Renderer::new()
        .unwrap()
        .render(format, &meta(), &result(), &episodes())
        .unwrap();
    assert_eq!(detect_format(&doc), format);
}

#[test]
fn full_items_without_episodes_is_refused() {
    let err = Renderer::new()
        .unwrap()
        .render(PlaylistFormat::FullItems, &meta(), &result(), &[])
        .unwrap_err();
    assert!(matches!(err, RenderError::NoEntries));
}

#[test]
fn only_build_date_varies_between_runs() {
    let renderer = Renderer::new().unwrap();
    let first = renderer
        .render(PlaylistFormat::RemoteItemsOnly, &meta(), &result(), &[])
        .unwrap();
    let again = renderer
        .render(PlaylistFormat::RemoteItemsOnly, &meta(), &result(), &[])
        .unwrap();
    assert_eq!(first, again);

    let mut later = meta();
    later.last_build_date = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
    let rebuilt = renderer
        .render(PlaylistFormat::RemoteItemsOnly, &later, &result(), &[])
        .unwrap();
    let changed: Vec<_> = first
        .lines()
        .zip(rebuilt.lines())
        .filter(|(a, b)| a != b)
        .collect();
    assert_eq!(changed.len(), 1);
    assert!(changed[0].1.contains("<lastBuildDate>Sat, 01 Feb 2025 00:00:00 GMT"));
}

#[test]
fn user_template_overrides_embedded_channel_block() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("_channel.xml.tera"),
        "    <title>{{ channel.title | xml }} (custom)</title>\r\n    <podcast:guid>{{ channel.guid }}</podcast:guid>",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let renderer = Renderer::with_template_dir(Some(dir.path())).unwrap();
    let doc = renderer
        .render(PlaylistFormat::RemoteItemsOnly, &meta(), &result(), &[])
        .unwrap();
    assert!(doc.contains("<title>Music Monday &amp; Friends (custom)</title>"));
    assert!(!doc.contains("<lastBuildDate>"));
    assert!(!doc.contains('\r'));
}

#[test]
fn missing_template_dir_falls_back_to_embedded() {
    let dir = TempDir::new().unwrap();
    let renderer = Renderer::with_template_dir(Some(&dir.path().join("absent"))).unwrap();
    let doc = renderer
        .render(PlaylistFormat::RemoteItemsOnly, &meta(), &result(), &[])
        .unwrap();
    assert!(doc.contains("<lastBuildDate>"));
}
