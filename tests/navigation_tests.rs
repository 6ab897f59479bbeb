use assert_matches::assert_matches;
use keytree::config::Config;
use keytree::error::BoxError;
use keytree::keys::Key;
use keytree::navigator::{Effect, ModeKind, Navigator, NavigatorSettings};
use keytree::overlay::{Overlay, Toggle};
use keytree::storage::{KeyValueStore, MemoryStore, Preferences, ThemePreference};
use keytree::surface::HeadlessSurface;
use keytree::tree::{Node, Resolver, Tree};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counter_action(name: &str, hits: &Arc<AtomicUsize>) -> Node {
    let hits = hits.clone();
    Node::action(name, move || {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.loader.retry_delay_ms = 1;
    config.loader.timeout_ms = 500;
    config
}

fn mounted(root: Tree, prefs: Preferences) -> Overlay {
    let mut overlay = Overlay::new(root, prefs, &fast_config()).unwrap();
    overlay.mount(Box::new(HeadlessSurface::new())).unwrap();
    overlay
}

async fn press_all(overlay: &mut Overlay, keys: &str) {
    for c in keys.chars() {
        overlay.press(Key::Char(c)).await;
    }
}

#[tokio::test]
async fn test_home_docs_scenario() {
    let hits = Arc::new(AtomicUsize::new(0));
    let root = Tree::new().with(Node::directory(
        "home",
        Tree::new().with(counter_action("docs", &hits)),
    ));
    let mut overlay = mounted(root, Preferences::in_memory());

    overlay.press(Key::Char('1')).await;
    assert_eq!(overlay.navigator().current_path(), &["home".to_string()]);

    overlay.press(Key::Char('1')).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(overlay.navigator().current_path(), &["home".to_string()]);

    overlay.press(Key::Backspace).await;
    assert!(overlay.navigator().current_path().is_empty());
}

#[test]
fn test_backspace_restores_the_same_snapshot() {
    let root = Tree::new()
        .with(Node::directory(
            "a",
            Tree::new().with(Node::directory("b", Tree::new().with(Node::noop("c")))),
        ))
        .with(Node::noop("z"));
    let mut nav = Navigator::new(
        Arc::new(root),
        Arc::new(Tree::new()),
        Arc::new(MemoryStore::new()),
        NavigatorSettings::default(),
    );

    nav.handle_key(Key::Char('1'));
    let path_before = nav.current_path().to_vec();
    let tree_before = nav.current_tree().clone();

    nav.handle_key(Key::Char('1'));
    assert_eq!(nav.current_path(), &["a".to_string(), "b".to_string()]);

    nav.handle_key(Key::Backspace);
    assert_eq!(nav.current_path(), path_before.as_slice());
    assert!(Arc::ptr_eq(nav.current_tree(), &tree_before));
}

#[tokio::test]
async fn test_palette_ranks_exact_name_first() {
    let hits = Arc::new(AtomicUsize::new(0));
    let root = Tree::new()
        .with(Node::directory(
            "guides",
            Tree::new()
                .with(Node::noop("documentation"))
                .with(counter_action("doc", &hits)),
        ))
        .with(Node::noop("docker"));
    let mut overlay = mounted(root, Preferences::in_memory());

    overlay.press(Key::Char('`')).await;
    press_all(&mut overlay, "doc").await;

    let results = &overlay.navigator().search_state().unwrap().results;
    assert_eq!(results[0].node.full_path, "guides/doc");
    assert!(results[0].score > 100.0);

    overlay.press(Key::Enter).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(overlay.navigator().current_path(), &["guides".to_string()]);
    assert_eq!(overlay.navigator().mode_kind(), ModeKind::Browse);
}

#[tokio::test]
async fn test_palette_jumps_into_directory_leaf_parent_and_edits_input() {
    let root = Tree::new().with(Node::directory(
        "settings",
        Tree::new().with(Node::directory(
            "profile",
            Tree::new().with(Node::input("nickname", "profile.nick")),
        )),
    ));
    let prefs = Preferences::in_memory();
    let mut overlay = mounted(root, prefs.clone());

    overlay.press(Key::Char('`')).await;
    press_all(&mut overlay, "nick").await;
    overlay.press(Key::Enter).await;
    assert_eq!(overlay.navigator().mode_kind(), ModeKind::InputEdit);
    assert_eq!(
        overlay.navigator().current_path(),
        &["settings".to_string(), "profile".to_string()]
    );
    assert_eq!(overlay.navigator().state().history.len(), 2);

    press_all(&mut overlay, "zed").await;
    overlay.press(Key::Enter).await;
    assert_eq!(prefs.store().get("profile.nick").unwrap(), Some("zed".to_string()));
    assert!(overlay.is_focused());
}

#[tokio::test]
async fn test_virtual_directory_resolves_once_and_is_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let resolver = Resolver::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, BoxError>(Tree::new().with(Node::noop("fetched"))) }
    });
    let root = Tree::new().with(Node::virtual_dir("remote", resolver));
    let mut overlay = mounted(root, Preferences::in_memory());

    overlay.press(Key::Char('1')).await;
    assert_eq!(overlay.navigator().current_path(), &["remote".to_string()]);
    assert!(overlay.navigator().current_tree().get("fetched").is_some());

    overlay.press(Key::Backspace).await;
    overlay.press(Key::Char('1')).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(overlay.loader().contains("remote"));
}

#[tokio::test]
async fn test_failed_virtual_directory_falls_back_and_retries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let resolver = Resolver::from_sync(move || {
        // Three failures exhaust the first sequence; the retry succeeds
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            Err("offline".into())
        } else {
            Ok(Tree::new().with(Node::noop("online")))
        }
    });
    let root = Tree::new().with(Node::virtual_dir("remote", resolver));
    let mut overlay = mounted(root, Preferences::in_memory());

    overlay.press(Key::Char('1')).await;
    assert!(overlay.navigator().current_tree().get("Load failed").is_some());
    let view = overlay.view_model().clone();
    assert!(view.message.unwrap().contains("offline"));
    assert!(!overlay.loader().contains("remote"));

    overlay.press(Key::Enter).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(overlay.navigator().current_tree().get("online").is_some());
    assert_eq!(overlay.navigator().current_path(), &["remote".to_string()]);
}

#[tokio::test]
async fn test_custom_fallback_tree() {
    let root = Tree::new().with(Node::virtual_dir(
        "remote",
        Resolver::from_sync(|| Err("nope".into())),
    ));
    let fallback = Tree::new().with(Node::noop("Nothing here"));
    let mut overlay = Overlay::with_fallback(root, fallback, Preferences::in_memory(), &fast_config()).unwrap();
    overlay.mount(Box::new(HeadlessSurface::new())).unwrap();

    overlay.press(Key::Char('1')).await;
    assert!(overlay.navigator().current_tree().get("Nothing here").is_some());
}

#[tokio::test]
async fn test_invalid_resolved_tree_is_rejected() {
    let mut crowded = Tree::new();
    for i in 0..24 {
        crowded.insert(Node::noop(format!("n{}", i)));
    }
    let crowded = Arc::new(crowded);
    let root = Tree::new().with(Node::virtual_dir(
        "big",
        Resolver::from_sync(move || Ok((*crowded).clone())),
    ));
    let mut overlay = mounted(root, Preferences::in_memory());

    overlay.press(Key::Char('1')).await;
    assert!(overlay.navigator().current_tree().get("Load failed").is_some());
    assert!(overlay.navigator().message().unwrap().contains("24 entries"));
}

#[tokio::test(start_paused = true)]
async fn test_keys_wait_while_loading() {
    let root = Tree::new()
        .with(Node::virtual_dir(
            "slow",
            Resolver::new(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<_, BoxError>(Tree::new().with(Node::noop("done")))
            }),
        ))
        .with(Node::noop("other"));
    let mut overlay = mounted(root, Preferences::in_memory());

    let requests = overlay.handle_key(Key::Char('1'));
    assert_eq!(requests.len(), 1);
    assert!(overlay.navigator().is_loading());
    assert!(overlay.view_model().loading);

    assert!(overlay.handle_key(Key::Char('2')).is_empty());
    overlay.handle_key(Key::Char('`'));
    assert_eq!(overlay.navigator().mode_kind(), ModeKind::Browse);

    let completion = overlay.run_load(&requests[0]).await;
    overlay.finish_load(completion);
    assert_eq!(overlay.navigator().current_path(), &["slow".to_string()]);
}

#[tokio::test]
async fn test_meta_theme_switch_via_palette() {
    let prefs = Preferences::in_memory();
    let mut overlay = mounted(Tree::new().with(Node::noop("home")), prefs.clone());
    assert!(overlay.navigator().root().get("@meta").is_none());

    overlay.press(Key::Char('`')).await;
    press_all(&mut overlay, "@meta/theme/light").await;
    let first = overlay.navigator().search_state().unwrap().results[0]
        .node
        .full_path
        .clone();
    assert_eq!(first, "@meta/theme/light");
    overlay.press(Key::Enter).await;
    assert_eq!(prefs.theme(), ThemePreference::Light);
    assert!(overlay.navigator().current_path().is_empty());
}

#[tokio::test]
async fn test_escape_in_browse_hides_and_activate_restores() {
    let mut overlay = mounted(Tree::new().with(Node::noop("x")), Preferences::in_memory());
    let transition = overlay.navigator_mut().handle_key(Key::Escape);
    assert_matches!(transition.effects.as_slice(), [Effect::Hide]);

    overlay.press(Key::Escape).await;
    assert!(!overlay.is_visible());
    assert_eq!(overlay.activate(), Toggle::Shown);
    assert!(overlay.is_visible());
}

#[tokio::test]
async fn test_last_position_falls_back_to_root_when_gone() {
    let store = Arc::new(MemoryStore::new());
    store.set("keytree.position", r#"["gone","away"]"#).unwrap();
    let overlay = mounted(Tree::new().with(Node::noop("x")), Preferences::new(store));
    assert!(overlay.navigator().current_path().is_empty());
}
