use super::*;
use crate::driver::{Rect, Viewport};
use crate::run_state::RunStateController;
use crate::testing::{FakeDom, FakePage, NodeId};

fn settings(keep_visible: bool) -> CaptureSettings {
    CaptureSettings {
        outline_width: "3px".to_string(),
        outline_style: "solid".to_string(),
        keep_visible,
        output_dir: PathBuf::from("out"),
        settle: Duration::ZERO,
    }
}

fn pipeline(keep_visible: bool, names: &[&str], interaction: Option<Interaction>) -> CapturePipeline {
    let categories = CategoryTable::new(names, &HashMap::new());
    let dataset = DatasetWriter::new(DatasetInfo::default(), &categories);
    CapturePipeline::new(settings(keep_visible), categories, interaction, dataset)
}

fn specs() -> Vec<AnnotationSpec> {
    vec![
        AnnotationSpec::new("h2", "title"),
        AnnotationSpec::new("img", "image"),
    ]
}

fn page_config(max_shots: usize) -> PageConfig {
    PageConfig {
        label: "feed".to_string(),
        targets: vec!["article".to_string()],
        max_shots,
        scroll_for_targets: true,
        include_iframes: true,
        annotations: specs(),
    }
}

fn interaction() -> Interaction {
    Interaction {
        component_selectors: vec!["article.expandable".to_string()],
        trigger_selector: "button.more".to_string(),
        expected_selector: "section.body".to_string(),
        timeout: Duration::from_secs(1),
    }
}

fn running_gate() -> (RunStateController, RunGate) {
    let controller = RunStateController::new();
    controller.start();
    let gate = controller.gate();
    (controller, gate)
}

/// Three 400px articles 900px apart, each with a title and an image.
fn feed(spec: &str) -> (FakeDom, Vec<NodeId>) {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    let mut articles = Vec::new();
    for i in 0..3 {
        let y = i as f64 * 900.0;
        let article = dom.append_at(doc, spec, Rect::new(0.0, y, 1280.0, 400.0));
        dom.append_at(article, "h2", Rect::new(20.0, y + 10.0, 600.0, 30.0));
        dom.append_at(article, "img", Rect::new(20.0, y + 60.0, 400.0, 300.0));
        articles.push(article);
    }
    (dom, articles)
}

fn assert_boxes_inside_images(dataset: &DatasetWriter) {
    for ann in dataset.annotations() {
        let image = dataset
            .images()
            .iter()
            .find(|i| i.id == ann.image_id)
            .expect("annotation references a registered image");
        let [x, y, w, h] = ann.bbox;
        assert!(w > 0 && h > 0);
        assert!(x + w <= image.width, "{:?} exceeds width {}", ann.bbox, image.width);
        assert!(y + h <= image.height, "{:?} exceeds height {}", ann.bbox, image.height);
    }
}

#[tokio::test]
async fn test_cycle_hides_outlines_in_screenshot_and_restores() {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    let title = dom.append_at(doc, "h2", Rect::new(10.0, 10.0, 200.0, 30.0));
    dom.set_outline(title, "1px dotted red");
    let image = dom.append_at(doc, "img", Rect::new(10.0, 50.0, 100.0, 100.0));
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], None);

    let outcome = pipeline.capture_cycle(&page, "feed", &specs(), true).await.unwrap();

    assert_eq!(outcome.file_name, "feed__1.png");
    assert_eq!(outcome.annotations, 2);
    let shots = page.screenshots();
    assert_eq!(shots.len(), 1);
    assert_eq!(shots[0].path, PathBuf::from("out/feed__1.png"));
    assert!(shots[0].outlined.is_empty());

    assert_eq!(page.outline(title), "1px dotted red");
    assert_eq!(page.outline(image), "");
    assert_eq!(page.attribute(title, CATEGORY_ATTRIBUTE), None);
    assert_eq!(page.live_handles(), 0);
}

#[tokio::test]
async fn test_cycle_keeps_outlines_visible() {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    let title = dom.append_at(doc, "h2", Rect::new(10.0, 10.0, 200.0, 30.0));
    let image = dom.append_at(doc, "img", Rect::new(10.0, 50.0, 100.0, 100.0));
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(true, &["title", "image"], None);

    pipeline.capture_cycle(&page, "feed", &specs(), true).await.unwrap();

    let shot = &page.screenshots()[0];
    assert!(shot.outlined.contains(&(page.key(title), "3px solid #1f77b4".to_string())));
    assert!(shot.outlined.contains(&(page.key(image), "3px solid #ff7f0e".to_string())));
    assert_eq!(page.outline(title), "");
    assert_eq!(page.outline(image), "");
}

#[tokio::test]
async fn test_cycle_clips_and_drops_offscreen_boxes() {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    dom.append_at(doc, "h2", Rect::new(-50.0, 780.0, 300.0, 40.0));
    dom.append_at(doc, "h2", Rect::new(0.0, 1200.0, 300.0, 40.0));
    dom.append_at(doc, "img", Rect::new(1200.0, 0.0, 200.0, 100.0));
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], None);

    let outcome = pipeline.capture_cycle(&page, "feed", &specs(), true).await.unwrap();

    assert_eq!(outcome.annotations, 2);
    let annotations = pipeline.dataset().annotations();
    assert_eq!(annotations[0].bbox, [0, 780, 250, 20]);
    assert_eq!(annotations[1].bbox, [1200, 0, 80, 100]);
    assert_boxes_inside_images(pipeline.dataset());
}

#[tokio::test]
async fn test_cycle_scales_by_device_pixel_ratio() {
    let mut dom = FakeDom::new(Viewport::new(800.0, 600.0, 2.0));
    let doc = dom.document();
    dom.append_at(doc, "img", Rect::new(10.0, 20.0, 30.0, 40.0));
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], None);

    pipeline.capture_cycle(&page, "feed", &specs(), true).await.unwrap();

    let image = &pipeline.dataset().images()[0];
    assert_eq!((image.width, image.height), (1600, 1200));
    assert_eq!(pipeline.dataset().annotations()[0].bbox, [20, 40, 60, 80]);
}

#[tokio::test]
async fn test_cycle_last_matching_spec_wins() {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    let heading = dom.append(doc, "h2.hero");
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(true, &["title", "image"], None);
    let specs = vec![
        AnnotationSpec::new("h2", "title"),
        AnnotationSpec::new("h2.hero", "image"),
    ];

    let outcome = pipeline.capture_cycle(&page, "feed", &specs, true).await.unwrap();

    assert_eq!(outcome.annotations, 1);
    assert_eq!(pipeline.dataset().annotations()[0].category_id, 2);
    let shot = &page.screenshots()[0];
    assert_eq!(shot.outlined, vec![(page.key(heading), "3px solid #ff7f0e".to_string())]);
}

#[tokio::test]
async fn test_cycle_skips_unknown_category() {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    let avatar = dom.append(doc, "img.avatar");
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(true, &["title"], None);
    let specs = vec![AnnotationSpec::new("img.avatar", "avatar")];

    let outcome = pipeline.capture_cycle(&page, "feed", &specs, true).await.unwrap();

    assert_eq!(outcome.annotations, 0);
    assert_eq!(pipeline.dataset().image_count(), 1);
    assert_eq!(page.attribute(avatar, CATEGORY_ATTRIBUTE), None);
    assert!(page.screenshots()[0].outlined.is_empty());
}

#[tokio::test]
async fn test_cycle_skips_invalid_annotation_selector() {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    dom.append(doc, "img");
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], None);
    let specs = vec![
        AnnotationSpec::new("h2[", "title"),
        AnnotationSpec::new("img", "image"),
    ];

    let outcome = pipeline.capture_cycle(&page, "feed", &specs, true).await.unwrap();
    assert_eq!(outcome.annotations, 1);
}

#[tokio::test]
async fn test_failed_screenshot_restores_page() {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    let title = dom.append(doc, "h2");
    dom.set_outline(title, "2px solid green");
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(true, &["title", "image"], None);

    page.fail_screenshots(true);
    assert!(pipeline.capture_cycle(&page, "feed", &specs(), true).await.is_err());

    assert_eq!(page.outline(title), "2px solid green");
    assert_eq!(page.attribute(title, CATEGORY_ATTRIBUTE), None);
    assert_eq!(page.live_handles(), 0);
    assert_eq!(pipeline.dataset().image_count(), 0);

    page.fail_screenshots(false);
    let outcome = pipeline.capture_cycle(&page, "feed", &specs(), true).await.unwrap();
    assert_eq!(outcome.file_name, "feed__1.png");
}

#[tokio::test]
async fn test_failed_flush_after_screenshot_still_records_image() {
    let mut dom = FakeDom::new(Viewport::new(1280.0, 800.0, 1.0));
    let doc = dom.document();
    let title = dom.append_at(doc, "h2", Rect::new(10.0, 10.0, 200.0, 30.0));
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], None);
    // Annotate, clear, then the flush after restoring.
    page.fail_flush(3);

    let outcome = pipeline.capture_cycle(&page, "feed", &specs(), true).await.unwrap();

    assert_eq!(outcome.file_name, "feed__1.png");
    assert_eq!(outcome.annotations, 1);
    assert_eq!(page.screenshots().len(), 1);
    assert_eq!(pipeline.dataset().image_count(), 1);
    assert_eq!(pipeline.dataset().images()[0].file_name, "feed__1.png");
    assert_eq!(page.outline(title), "");
    assert_eq!(page.live_handles(), 0);
}

#[tokio::test]
async fn test_shot_indexes_are_per_label() {
    let page = FakePage::new(FakeDom::new(Viewport::new(1280.0, 800.0, 1.0)));
    let mut pipeline = pipeline(false, &["title"], None);

    let mut names = Vec::new();
    for label in ["feed", "post", "feed"] {
        let outcome = pipeline.capture_cycle(&page, label, &[], true).await.unwrap();
        names.push(outcome.file_name);
    }
    assert_eq!(names, vec!["feed__1.png", "post__1.png", "feed__2.png"]);
}

#[tokio::test]
async fn test_enumerate_two_categories_three_elements_two_shots() {
    let (dom, _) = feed("article");
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], None);
    let (_controller, mut gate) = running_gate();

    let report = pipeline
        .enumerate_targets(&page, &mut gate, &page_config(2), &ScrollTuning::default())
        .await
        .unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.images, 2);
    assert_eq!(report.failed, 0);

    let dataset = pipeline.dataset();
    let files: Vec<&str> = dataset.images().iter().map(|i| i.file_name.as_str()).collect();
    assert_eq!(files, vec!["feed__1.png", "feed__2.png"]);
    assert_eq!(dataset.annotation_count(), 4);
    for ann in dataset.annotations() {
        assert!(ann.category_id == 1 || ann.category_id == 2);
    }
    assert_boxes_inside_images(dataset);
    assert_eq!(page.screenshots()[1].scroll_y, 700.0);
    assert_eq!(page.live_handles(), 0);
}

#[tokio::test]
async fn test_enumerate_without_scrolling_uses_attached_targets() {
    let (mut dom, articles) = feed("article");
    dom.appear_after_scroll(articles[2], 1500.0);
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], None);
    let (_controller, mut gate) = running_gate();
    let mut config = page_config(10);
    config.scroll_for_targets = false;

    let report = pipeline
        .enumerate_targets(&page, &mut gate, &config, &ScrollTuning::default())
        .await
        .unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.images, 2);
    assert_eq!(page.scroll_count(), 0);
}

#[tokio::test]
async fn test_enumerate_isolates_target_failures() {
    let (dom, _) = feed("article");
    let page = FakePage::new(dom);
    page.fail_screenshots(true);
    let mut pipeline = pipeline(false, &["title", "image"], None);
    let (_controller, mut gate) = running_gate();

    let report = pipeline
        .enumerate_targets(&page, &mut gate, &page_config(3), &ScrollTuning::default())
        .await
        .unwrap();

    assert_eq!(report.failed, 3);
    assert_eq!(report.images, 0);
    assert_eq!(page.live_handles(), 0);
}

#[tokio::test]
async fn test_enumerate_stops_on_stop_signal() {
    let (dom, _) = feed("article");
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], None);
    let controller = RunStateController::new();
    controller.stop();
    let mut gate = controller.gate();

    let report = pipeline
        .enumerate_targets(&page, &mut gate, &page_config(10), &ScrollTuning::default())
        .await
        .unwrap();

    assert!(report.stopped);
    assert_eq!(report.images, 0);
    assert!(page.screenshots().is_empty());
    assert_eq!(page.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_capture_finishes_current_target_only() {
    let (dom, _) = feed("article");
    let page = FakePage::new(dom);
    let mut settings = settings(false);
    settings.settle = Duration::from_millis(500);
    let categories = CategoryTable::new(&["title", "image"], &HashMap::new());
    let dataset = DatasetWriter::new(DatasetInfo::default(), &categories);
    let mut pipeline = CapturePipeline::new(settings, categories, None, dataset);
    let (controller, mut gate) = running_gate();
    let mut config = page_config(3);
    config.scroll_for_targets = false;

    // Lands in the settle delay of the first target.
    let stopper = controller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.stop();
    });

    let report = pipeline
        .enumerate_targets(&page, &mut gate, &config, &ScrollTuning::default())
        .await
        .unwrap();

    assert_eq!(report.candidates, 3);
    assert!(report.stopped);
    assert_eq!(report.images, 1);
    assert_eq!(page.screenshots().len(), 1);
    assert_eq!(pipeline.dataset().image_count(), 1);
    assert_eq!(pipeline.dataset().images()[0].file_name, "feed__1.png");
    assert_eq!(pipeline.dataset().annotation_count(), 2);
    assert_eq!(page.live_handles(), 0);
}

#[tokio::test]
async fn test_component_without_trigger_captured_once() {
    let (dom, _) = feed("article.expandable");
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], Some(interaction()));
    let (_controller, mut gate) = running_gate();

    let report = pipeline
        .enumerate_targets(&page, &mut gate, &page_config(1), &ScrollTuning::default())
        .await
        .unwrap();

    assert_eq!(report.images, 1);
    assert!(page.clicks().is_empty());
}

#[tokio::test]
async fn test_component_with_trigger_captured_twice() {
    let (mut dom, articles) = feed("article.expandable");
    let button = dom.append_at(articles[0], "button.more", Rect::new(700.0, 10.0, 80.0, 30.0));
    let body = dom.append_at(articles[0], "section.body", Rect::new(20.0, 370.0, 600.0, 20.0));
    dom.reveal_on_click(button, body);
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], Some(interaction()));
    let (_controller, mut gate) = running_gate();

    let report = pipeline
        .enumerate_targets(&page, &mut gate, &page_config(1), &ScrollTuning::default())
        .await
        .unwrap();

    assert_eq!(report.images, 2);
    assert_eq!(page.clicks(), vec![page.key(button)]);
    let files: Vec<String> = pipeline
        .dataset()
        .images()
        .iter()
        .map(|i| i.file_name.clone())
        .collect();
    assert_eq!(files, vec!["feed__1.png", "feed__2.png"]);
    assert_eq!(page.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_component_captured_twice_when_content_never_appears() {
    let (mut dom, articles) = feed("article.expandable");
    dom.append_at(articles[0], "button.more", Rect::new(700.0, 10.0, 80.0, 30.0));
    let page = FakePage::new(dom);
    let mut pipeline = pipeline(false, &["title", "image"], Some(interaction()));
    let (_controller, mut gate) = running_gate();

    let report = pipeline
        .enumerate_targets(&page, &mut gate, &page_config(1), &ScrollTuning::default())
        .await
        .unwrap();

    assert_eq!(report.images, 2);
    assert_eq!(page.clicks().len(), 1);
}
