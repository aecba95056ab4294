use tilemosaic::layers::tile::peer::tile_bounds;
use tilemosaic::prelude::*;

/// End-to-end reconciliation scenarios driven through the headless backend
/// and a deferred loader, so every load completes exactly when the test
/// says so.
#[cfg(test)]
mod reconcile_tests {
    use super::*;

    struct Harness {
        peer: TileLayerPeer,
        queue: DeferredQueue,
        container: Rc<HeadlessContainer>,
        handle: ContainerRef,
        factory: HeadlessFactory,
    }

    impl Harness {
        fn new(config: TileLoadingConfig) -> Self {
            let loader = DeferredLoader::new();
            let queue = loader.queue();
            let selector = TileSelector::new("mem://${level}/${tileX}/${tileY}", Box::new(loader));
            let container = HeadlessContainer::shared();
            let handle: ContainerRef = container.clone();
            Self {
                peer: TileLayerPeer::new(selector, 1.0, config),
                queue,
                container,
                handle,
                factory: HeadlessFactory::new(),
            }
        }

        fn reset(&mut self, state: &MapState) -> ReconcileReport {
            self.peer.on_reset(state, &self.handle, &mut self.factory)
        }

        fn position(&mut self, state: &MapState) -> ReconcileReport {
            self.peer.on_position(state, &self.handle, &mut self.factory)
        }

        fn deliver_all(&mut self) -> usize {
            self.queue.complete_all(|_| Ok(b"tile".to_vec()));
            self.peer.process_load_results(&mut self.factory)
        }

        fn fail(&mut self, id: &str) -> usize {
            let request = self.queue.latest(id).unwrap();
            self.queue
                .complete(request.ticket, Err(MosaicError::Load("503".into())));
            self.peer.process_load_results(&mut self.factory)
        }

        fn handle_of(&self, id: &str) -> Option<u64> {
            let drawable = self.peer.current().get(id)?.drawable()?;
            self.factory.ledger().handle_of(drawable)
        }
    }

    fn default_config() -> TileLoadingConfig {
        TileLoadingConfig {
            stale_completions: StalePolicy::Apply,
            ..TileLoadingConfig::default()
        }
    }

    /// Single level, one projected unit per pixel
    fn flat() -> Arc<dyn Projection> {
        Arc::new(PlanarProjection::new(4096.0, 4096.0, 1.0, 0))
    }

    /// Level 1 at resolution 2, level 2 at resolution 1
    fn pyramid() -> Arc<dyn Projection> {
        Arc::new(PlanarProjection::new(8192.0, 8192.0, 4.0, 4))
    }

    #[test]
    fn test_resize_demotes_only_outside_tiles() {
        let mut h = Harness::new(default_config());
        let prj = flat();
        let ledger = h.factory.ledger();

        let report = h.reset(&MapState::new(prj.clone(), 1.0, 600.0, 400.0));
        assert_eq!(report.selected, 6);
        assert_eq!(report.created.len(), 6);
        assert_eq!(report.loads_issued, 6);
        assert_eq!(h.deliver_all(), 6);
        assert_eq!(h.container.len(), 6);

        let visible = ["0,0@0", "1,0@0", "0,1@0", "1,1@0"];
        let before: Vec<_> = visible.iter().map(|id| h.handle_of(id)).collect();
        assert!(before.iter().all(Option::is_some));

        let report = h.reset(&MapState::new(prj.clone(), 1.0, 300.0, 300.0));
        assert_eq!(report.selected, 4);
        assert_eq!(report.reused, 4);
        assert!(report.created.is_empty());
        assert_eq!(report.demoted, ["2,0@0", "2,1@0"]);
        assert_eq!(report.loads_issued, 0);

        // Nothing visible was reloaded or replaced
        assert_eq!(h.queue.issued().len(), 6);
        let after: Vec<_> = visible.iter().map(|id| h.handle_of(id)).collect();
        assert_eq!(before, after);
        assert_eq!(ledger.destroyed(), 2);
        assert_eq!(h.container.len(), 4);
        for handle in after.iter().flatten() {
            assert!(h.container.contains(*handle));
        }
        assert!(h.peer.old().is_empty());
    }

    #[test]
    fn test_pan_moves_tiles() {
        let mut h = Harness::new(default_config());
        let mut state = MapState::new(flat(), 1.0, 300.0, 300.0);
        h.reset(&state);
        h.deliver_all();

        state.x = 128.0;
        state.y = 64.0;
        let report = h.position(&state);
        assert_eq!(report.reused, 4);
        assert_eq!(report.loads_issued, 0);

        let tile = h.peer.current().get("0,0@0").unwrap();
        assert_eq!(*tile.bounds(), PixelRect::new(-128, -64, 256, 256));
        let placed = h.factory.ledger().bounds_of(tile.drawable().unwrap());
        assert_eq!(placed, Some(PixelRect::new(-128, -64, 256, 256)));
    }

    #[test]
    fn test_zoom_paints_previews_from_previous_level() {
        let mut h = Harness::new(default_config());
        let prj = pyramid();
        let ledger = h.factory.ledger();

        h.reset(&MapState::new(prj.clone(), 2.0, 512.0, 512.0));
        assert_eq!(h.deliver_all(), 4);

        let report = h.reset(&MapState::new(prj, 1.0, 512.0, 512.0));
        assert_eq!(report.created, ["0,0@2", "1,0@2", "0,1@2", "1,1@2"]);
        assert_eq!(report.demoted.len(), 4);
        assert_eq!(report.loads_issued, 4);
        assert_eq!(report.previews, 4);
        assert_eq!(ledger.composites(), 4);

        // The single level-1 tile at the origin covers all four new tiles
        for id in &report.created {
            let tile = h.peer.current().get(id).unwrap();
            assert_eq!(ledger.sources_of(tile.drawable().unwrap()), ["image:0,0@1"]);
        }
        assert_eq!(h.container.len(), 4);
        assert!(h.peer.old().is_empty());

        // Real imagery replaces the previews in place
        let order = h.container.order();
        assert_eq!(h.deliver_all(), 4);
        assert_eq!(h.container.len(), 4);
        assert!(order.iter().all(|handle| !h.container.contains(*handle)));
        let tile = h.peer.current().get("1,1@2").unwrap();
        assert_eq!(ledger.label_of(tile.drawable().unwrap()).unwrap(), "image:1,1@2");
    }

    #[test]
    fn test_no_preview_without_compositor() {
        let mut h = Harness::new(default_config());
        h.factory = HeadlessFactory::without_compositing();
        let prj = pyramid();

        h.reset(&MapState::new(prj.clone(), 2.0, 512.0, 512.0));
        h.deliver_all();
        let report = h.reset(&MapState::new(prj, 1.0, 512.0, 512.0));

        assert_eq!(report.previews, 0);
        assert!(h.peer.current().iter().all(|tile| !tile.has_drawable()));
        assert!(h.peer.current().iter().all(|tile| tile.is_attached()));
    }

    #[test]
    fn test_transition_preloads_target() {
        let mut h = Harness::new(default_config());
        let prj = pyramid();
        let start = MapState::new(prj.clone(), 2.0, 512.0, 512.0);
        h.reset(&start);
        h.deliver_all();

        let target = Arc::new(MapState::new(prj, 1.0, 512.0, 512.0));
        let mut expected: Vec<String> = h.peer.keys_for(&target).into_iter().map(|k| k.id).collect();
        expected.sort();

        let animating = start.clone().with_final_state(Arc::clone(&target));
        let report = h.reset(&animating);
        assert_eq!(report.preloaded, Some(4));
        assert!(h.peer.is_transitioning());
        assert_eq!(h.peer.transition().ids(), expected);
        assert!(h
            .peer
            .transition()
            .iter()
            .all(|tile| tile.loading && !tile.is_attached() && !tile.has_drawable()));
        assert_eq!(report.reused, 4);
        assert_eq!(report.loads_issued, 0);
        assert_eq!(h.queue.issued().len(), 8);

        // Same target, no second preload
        let report = h.reset(&animating);
        assert_eq!(report.preloaded, None);
        assert_eq!(h.queue.issued().len(), 8);

        let report = h.reset(&target);
        assert!(!h.peer.is_transitioning());
        assert_eq!(report.stolen, 4);
        assert_eq!(report.loads_issued, 0);
        assert_eq!(report.previews, 4);
        assert!(h.peer.transition().is_empty());
        assert!(h.peer.old().is_empty());
    }

    #[test]
    fn test_preloaded_tiles_arrive_loaded() {
        let mut h = Harness::new(default_config());
        let prj = pyramid();
        let start = MapState::new(prj.clone(), 2.0, 512.0, 512.0);
        h.reset(&start);
        h.deliver_all();

        let target = Arc::new(MapState::new(prj, 1.0, 512.0, 512.0));
        h.reset(&start.clone().with_final_state(Arc::clone(&target)));

        // Preloaded imagery stays off screen until the tiles are claimed
        assert_eq!(h.deliver_all(), 4);
        assert_eq!(h.container.len(), 4);
        assert!(h.peer.transition().iter().all(|tile| tile.has_drawable()));

        let report = h.reset(&target);
        assert_eq!(report.stolen, 4);
        assert_eq!(report.previews, 0);
        assert_eq!(h.container.len(), 4);
        let ledger = h.factory.ledger();
        let tile = h.peer.current().get("0,0@2").unwrap();
        assert_eq!(ledger.label_of(tile.drawable().unwrap()).unwrap(), "image:0,0@2");
    }

    #[test]
    fn test_temporary_tiles_replaced_after_transition() {
        let mut h = Harness::new(default_config());
        let prj = pyramid();
        h.reset(&MapState::new(prj.clone(), 2.0, 512.0, 512.0));
        h.deliver_all();

        // Halfway through a zoom in, the viewport covers more level-2 cells
        // than the target does
        let target = Arc::new(MapState::new(prj.clone(), 1.0, 512.0, 512.0));
        let halfway = MapState::new(prj.clone(), 1.2, 512.0, 512.0).with_final_state(target);
        let report = h.reset(&halfway);

        let placeholders = ["2,0@2", "2,1@2", "0,2@2", "1,2@2", "2,2@2"];
        assert_eq!(report.selected, 9);
        assert_eq!(report.stolen, 4);
        assert_eq!(report.created, placeholders);
        assert_eq!(report.loads_issued, 0);
        for id in placeholders {
            let tile = h.peer.current().get(id).unwrap();
            assert!(tile.temporary && !tile.loading);
        }
        assert_eq!(h.peer.old().len(), 4);
        assert_eq!(h.queue.issued().len(), 8);

        let report = h.reset(&MapState::new(prj, 1.0, 768.0, 768.0));
        assert_eq!(report.reused, 4);
        assert_eq!(report.created, placeholders);
        assert_eq!(report.loads_issued, 5);
        assert!(h.peer.current().iter().all(|tile| !tile.temporary));
        assert_eq!(h.queue.issued().len(), 13);
        assert!(h.peer.old().is_empty());
    }

    #[test]
    fn test_old_tiles_follow_display_during_transition() {
        let mut h = Harness::new(default_config());
        let prj = flat();
        let mut state = MapState::new(prj.clone(), 1.0, 256.0, 256.0);
        h.reset(&state);
        h.deliver_all();

        // Heading somewhere far away, so old survives every pass
        let mut far = MapState::new(prj, 1.0, 256.0, 256.0);
        far.x = 2048.0;
        let target = Arc::new(far);

        state.x = 300.0;
        let first = state.clone().with_final_state(Arc::clone(&target));
        h.reset(&first);
        assert!(h.peer.is_transitioning());
        let tile = h.peer.old().get("0,0@0").unwrap();
        assert_eq!(*tile.bounds(), tile_bounds(&first, &tile.key, 1.0));

        state.x = 600.0;
        let second = state.clone().with_final_state(Arc::clone(&target));
        h.position(&second);
        assert!(h.peer.is_transitioning());
        assert!(h.peer.old().len() > 1);

        let ledger = h.factory.ledger();
        let tile = h.peer.old().get("0,0@0").unwrap();
        assert_eq!(*tile.bounds(), PixelRect::new(-600, 0, 256, 256));
        assert_eq!(ledger.bounds_of(tile.drawable().unwrap()), Some(*tile.bounds()));
        for tile in h.peer.old().iter() {
            assert_eq!(*tile.bounds(), tile_bounds(&second, &tile.key, 1.0));
        }
    }

    #[test]
    fn test_late_completion_after_disposal() {
        let mut h = Harness::new(default_config());
        let prj = flat();
        h.reset(&MapState::new(prj.clone(), 1.0, 300.0, 300.0));
        let report = h.reset(&MapState::new(prj, 1.0, 100.0, 100.0));
        assert_eq!(report.demoted.len(), 3);

        let cancelled = h.queue.cancelled();
        assert_eq!(cancelled.len(), 3);
        for request in &cancelled {
            assert!(h.queue.complete(request.ticket, Ok(b"late".to_vec())));
        }

        assert_eq!(h.peer.process_load_results(&mut h.factory), 0);
        assert_eq!(h.factory.ledger().created(), 0);
        assert_eq!(h.peer.current().len(), 1);
        assert_eq!(h.peer.selector().pending_count(), 1);
        assert!(h.container.is_empty());
    }

    #[test]
    fn test_superseded_load_does_not_touch_new_tile() {
        let mut h = Harness::new(default_config());
        let prj = flat();
        let wide = MapState::new(prj.clone(), 1.0, 300.0, 300.0);
        h.reset(&wide);
        h.reset(&MapState::new(prj, 1.0, 100.0, 100.0));
        h.reset(&wide);

        let requests: Vec<_> = h
            .queue
            .issued()
            .into_iter()
            .filter(|request| request.id == "1,0@0")
            .collect();
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0].ticket, requests[1].ticket);

        h.queue.complete(requests[0].ticket, Ok(b"stale".to_vec()));
        assert_eq!(h.peer.process_load_results(&mut h.factory), 0);
        let tile = h.peer.current().get("1,0@0").unwrap();
        assert!(tile.loading && !tile.has_drawable());
        assert!(h.peer.selector().pending("1,0@0").is_some());

        h.queue.complete(requests[1].ticket, Ok(b"fresh".to_vec()));
        assert_eq!(h.peer.process_load_results(&mut h.factory), 1);
        assert!(h.peer.current().get("1,0@0").unwrap().has_drawable());
        assert!(h.peer.selector().pending("1,0@0").is_none());
    }

    /// Starts a zoom out while level-2 loads are still in flight, then
    /// completes one of them after its tile was demoted
    fn complete_demoted_load(config: TileLoadingConfig) -> (Harness, usize) {
        let mut h = Harness::new(config);
        let prj = pyramid();
        h.reset(&MapState::new(prj.clone(), 1.0, 512.0, 512.0));

        let target = Arc::new(MapState::new(prj.clone(), 2.0, 512.0, 512.0));
        let zooming = MapState::new(prj, 2.0, 512.0, 512.0).with_final_state(target);
        let report = h.reset(&zooming);
        assert_eq!(report.stolen, 4);
        assert_eq!(h.peer.old().len(), 4);

        let request = h.queue.latest("0,0@2").unwrap();
        h.queue.complete(request.ticket, Ok(b"tile".to_vec()));
        let applied = h.peer.process_load_results(&mut h.factory);
        (h, applied)
    }

    #[test]
    fn test_stale_completion_applied_by_default() {
        let (h, applied) = complete_demoted_load(default_config());
        assert_eq!(applied, 1);
        let tile = h.peer.old().get("0,0@2").unwrap();
        assert!(tile.has_drawable() && !tile.loading);
    }

    #[test]
    fn test_stale_completion_discarded_when_strict() {
        let (h, applied) = complete_demoted_load(LoadingProfile::Strict.resolve());
        assert_eq!(applied, 0);
        let tile = h.peer.old().get("0,0@2").unwrap();
        assert!(!tile.has_drawable() && !tile.loading);
        assert!(h.peer.selector().pending("0,0@2").is_none());
    }

    fn retrying() -> TileLoadingConfig {
        TileLoadingConfig {
            max_retries: 2,
            retry_delay_ms: 0,
            exponential_backoff: false,
            stale_completions: StalePolicy::Apply,
        }
    }

    #[test]
    fn test_failed_load_not_retried_by_default() {
        let mut h = Harness::new(default_config());
        h.reset(&MapState::new(flat(), 1.0, 200.0, 200.0));

        assert_eq!(h.fail("0,0@0"), 0);
        assert_eq!(h.peer.handle_load_retries(), 0);
        let tile = h.peer.current().get("0,0@0").unwrap();
        assert!(tile.has_failed() && !tile.loading && !tile.has_drawable());
        assert_eq!(h.queue.issued().len(), 1);
    }

    #[test]
    fn test_retry_until_budget_exhausted() {
        let mut h = Harness::new(retrying());
        h.reset(&MapState::new(flat(), 1.0, 200.0, 200.0));

        for attempt in 1..=2 {
            assert_eq!(h.fail("0,0@0"), 0);
            assert_eq!(h.peer.handle_load_retries(), 1);
            let request = h.queue.latest("0,0@0").unwrap();
            assert_eq!(request.ticket.attempt, attempt);
            let tile = h.peer.current().get("0,0@0").unwrap();
            assert!(tile.loading && !tile.has_failed());
            assert_eq!(tile.retry_count(), attempt);
        }

        assert_eq!(h.fail("0,0@0"), 0);
        assert_eq!(h.peer.handle_load_retries(), 0);
        let tile = h.peer.current().get("0,0@0").unwrap();
        assert!(tile.has_failed() && !tile.loading);
        assert_eq!(h.queue.issued().len(), 3);
    }

    #[test]
    fn test_retry_recovers() {
        let mut h = Harness::new(retrying());
        h.reset(&MapState::new(flat(), 1.0, 200.0, 200.0));

        h.fail("0,0@0");
        assert_eq!(h.peer.handle_load_retries(), 1);
        assert_eq!(h.deliver_all(), 1);

        let tile = h.peer.current().get("0,0@0").unwrap();
        assert!(tile.has_drawable() && !tile.has_failed());
        assert_eq!(h.container.len(), 1);
    }

    #[test]
    fn test_detach_releases_everything() {
        let mut h = Harness::new(default_config());
        let prj = pyramid();
        let start = MapState::new(prj.clone(), 2.0, 512.0, 512.0);
        h.reset(&start);
        h.deliver_all();
        let target = Arc::new(MapState::new(prj, 1.0, 512.0, 512.0));
        h.reset(&start.with_final_state(target));

        h.peer.detach();
        assert!(h.peer.current().is_empty());
        assert!(h.peer.transition().is_empty());
        assert!(!h.peer.is_transitioning());
        assert!(h.container.is_empty());
        assert_eq!(h.factory.ledger().live(), 0);
        assert_eq!(h.peer.selector().pending_count(), 0);
        assert!(h.queue.outstanding().is_empty());
    }

    #[test]
    fn test_layer_dispatch() {
        let loader = DeferredLoader::new();
        let queue = loader.queue();
        let mut layer = TileLayer::new(
            "base",
            TileLayerOptions::new("mem://${id}"),
            Box::new(loader),
        )
        .unwrap();
        let container: ContainerRef = HeadlessContainer::shared();
        let mut factory = HeadlessFactory::new();
        let mut ctx = PeerContext::new(&container, &mut factory);
        assert_eq!(layer.kind(), AttachmentKind::Tiles);

        let prj = flat();
        let first = MapState::new(prj.clone(), 1.0, 300.0, 300.0);
        layer.on_reset(&first, &mut ctx);
        assert_eq!(layer.last_report().unwrap().selected, 4);

        let mut moved = first.clone();
        moved.x = 256.0;
        assert_eq!(dispatch_change(&mut layer, &first, &moved, &mut ctx), StateChange::Position);
        let report = layer.last_report().unwrap();
        assert_eq!(report.demoted, ["0,0@0", "0,1@0"]);
        assert_eq!(report.created, ["2,0@0", "2,1@0"]);

        queue.complete_all(|_| Ok(b"tile".to_vec()));
        assert!(layer.update(&mut ctx));
        assert!(!layer.is_loading());

        layer.on_detach();
        assert!(layer.peer().current().is_empty());
        assert!(layer.last_report().is_none());
    }
}
