// Device runtime tests: queue ordering, host mappings, adapters and pooling
//
// Every test creates its own Device, so queues and pools never leak state
// between tests.

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;

    use islet_core::{
        Access, BufferDescriptor, DescPolicy, Element, Error, ErrorKind, MatrixAdapter,
        MatrixDescriptor, Result, Size,
    };
    use islet_device::{
        describe, AccessMode, AccessScope, AnyBuffer, Buffer, BufferAdapter, Device,
        DeviceConfig, MappingStats,
    };

    fn device() -> Device {
        Device::default_device().unwrap()
    }

    // Queue

    #[test]
    fn test_commands_run_in_submission_order() {
        let dev = device();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..32 {
            let log = log.clone();
            dev.queue()
                .submit(move |_| {
                    log.lock().unwrap().push(i);
                    Ok(())
                })
                .unwrap();
        }
        dev.wait().unwrap();
        assert_eq!(*log.lock().unwrap(), (0..32).collect::<Vec<_>>());
        let stats = dev.queue().stats();
        assert_eq!(stats.submitted, 32);
        assert_eq!(stats.completed, 32);
        assert_eq!(stats.pending(), 0);
    }

    #[test]
    fn test_wait_reports_first_error_once() {
        let dev = device();
        dev.queue()
            .submit(|_| Err(Error::device("first")))
            .unwrap();
        dev.queue()
            .submit(|_| Err(Error::device("second")))
            .unwrap();
        let err = dev.wait().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Device);
        assert!(err.to_string().contains("first"));
        // Reported errors are cleared.
        dev.wait().unwrap();
    }

    #[test]
    fn test_panicking_command_becomes_device_error() {
        let dev = device();
        dev.queue().submit(|_| panic!("kernel blew up")).unwrap();
        let err = dev.wait().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Device);
        assert!(err.to_string().contains("kernel blew up"));

        // The worker survives.
        let buf = Buffer::<u8>::zeros(&dev, &[4]).unwrap();
        buf.fill(3.0).unwrap();
        assert_eq!(buf.to_vec().unwrap(), vec![3; 4]);
    }

    #[test]
    fn test_usage_errors_from_commands_surface_as_device_errors() {
        let dev = device();
        dev.queue()
            .submit(|_| Err(Error::msg("bad argument")))
            .unwrap();
        assert_eq!(dev.wait().unwrap_err().kind(), ErrorKind::Device);
    }

    // Buffers

    #[test]
    fn test_buffer_range_checked() {
        let dev = device();
        assert!(Buffer::<f32>::zeros(&dev, &[]).is_err());
        assert!(Buffer::<f32>::zeros(&dev, &[1, 2, 3, 4]).is_err());
        assert!(Buffer::<f32>::from_vec(&dev, &[2, 2], vec![1.0; 3]).is_err());

        let b = Buffer::<f32>::from_vec(&dev, &[2, 3], (0..6).map(|v| v as f32).collect())
            .unwrap();
        assert_eq!(b.len(), 6);
        assert_eq!(b.range(), &[2, 3]);
        assert_eq!(b.to_f64_vec().unwrap(), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_fill_saturates() {
        let dev = device();
        let b = Buffer::<u8>::zeros(&dev, &[3]).unwrap();
        b.fill(1000.0).unwrap();
        assert_eq!(b.to_vec().unwrap(), vec![255; 3]);
        let s = Buffer::<i16>::zeros(&dev, &[2]).unwrap();
        s.fill(-1.6).unwrap();
        assert_eq!(s.to_vec().unwrap(), vec![-2; 2]);
    }

    #[test]
    fn test_parallel_map() {
        let dev = device();
        let src = Buffer::<u8>::from_vec(&dev, &[4], vec![1, 2, 3, 250]).unwrap();
        let dst = Buffer::<f32>::zeros(&dev, &[4]).unwrap();
        let (s, d) = (src.clone(), dst.clone());
        dev.queue()
            .submit(move |scope| scope.parallel_map(&s, &d, |v: u8| v as f32 * 0.5))
            .unwrap();
        assert_eq!(dst.to_vec().unwrap(), vec![0.5, 1.0, 1.5, 125.0]);

        let same = src.clone();
        dev.queue()
            .submit(move |scope| scope.parallel_map(&same, &same, |v: u8| v))
            .unwrap();
        assert!(dev.wait().is_err());
    }

    // Access scopes

    fn stats<T: Element>(b: &Buffer<T>) -> MappingStats {
        b.mapping_stats()
    }

    #[test]
    fn test_scope_released_once_on_normal_exit() {
        let dev = device();
        let b = Buffer::<i32>::zeros(&dev, &[2, 2, 1]).unwrap();
        {
            let mut scope = AccessScope::open(&b, AccessMode::Write).unwrap();
            scope.as_mut_slice().unwrap()[3] = 42;
            assert_eq!(stats(&b).live, 1);
        }
        assert_eq!(
            stats(&b),
            MappingStats {
                opened: 1,
                released: 1,
                live: 0
            }
        );
        assert_eq!(b.to_vec().unwrap(), vec![0, 0, 0, 42]);
    }

    #[test]
    fn test_scope_released_once_on_early_return() {
        fn touch_then_fail(b: &Buffer<f32>) -> Result<f32> {
            let scope = AccessScope::open(b, AccessMode::Read)?;
            let first = scope.as_slice()[0];
            Err::<(), _>(Error::msg("late failure"))?;
            Ok(first)
        }

        let dev = device();
        let b = Buffer::<f32>::zeros(&dev, &[8]).unwrap();
        assert!(touch_then_fail(&b).is_err());
        let s = stats(&b);
        assert_eq!((s.opened, s.released, s.live), (1, 1, 0));
    }

    #[test]
    fn test_scope_released_once_on_panic() {
        let dev = device();
        let b = Buffer::<u16>::zeros(&dev, &[8]).unwrap();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _scope = AccessScope::open(&b, AccessMode::Write).unwrap();
            panic!("callback failed while mapped");
        }));
        assert!(result.is_err());
        let s = stats(&b);
        assert_eq!((s.opened, s.released, s.live), (1, 1, 0));
        // The buffer is usable again.
        b.fill(9.0).unwrap();
        assert_eq!(b.to_vec().unwrap(), vec![9; 8]);
    }

    #[test]
    fn test_unsupported_mode_touches_nothing() {
        let dev = device();
        let b = Buffer::<u8>::zeros(&dev, &[4, 4, 1]).unwrap();

        // Park the queue on a command that only finishes when we say so. If
        // open() waited on the queue it would never return.
        let (release_tx, release_rx) = mpsc::channel::<()>();
        dev.queue()
            .submit(move |_| {
                let _ = release_rx.recv();
                Ok(())
            })
            .unwrap();

        for mode in [AccessMode::ReadWrite, AccessMode::DiscardWrite] {
            let err = AccessScope::open(&b, mode).err().unwrap();
            assert!(matches!(err, Error::UnsupportedAccess { .. }));
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
        assert_eq!(stats(&b), MappingStats::default());
        assert_eq!(dev.queue().stats().completed, 0);

        release_tx.send(()).unwrap();
        dev.wait().unwrap();
    }

    #[test]
    fn test_open_waits_for_submitted_work() {
        let dev = device();
        let b = Buffer::<f64>::zeros(&dev, &[1000]).unwrap();
        b.fill(2.5).unwrap();
        let scope = AccessScope::open(&b, AccessMode::Read).unwrap();
        assert!(scope.as_slice().iter().all(|&v| v == 2.5));
        assert_eq!(dev.queue().stats().pending(), 0);
    }

    #[test]
    fn test_conflicting_mappings() {
        let dev = device();
        let b = Buffer::<u8>::zeros(&dev, &[4]).unwrap();
        let w = AccessScope::open(&b, AccessMode::Write).unwrap();
        let err = AccessScope::open(&b, AccessMode::Read).err().unwrap();
        assert!(matches!(err, Error::MappingConflict { .. }));
        assert!(b.to_vec().is_err());

        // Device work on a host-mapped buffer fails instead of blocking.
        let target = b.clone();
        dev.queue()
            .submit(move |scope| scope.write(&target).map(|_| ()))
            .unwrap();
        assert_eq!(dev.wait().unwrap_err().kind(), ErrorKind::Device);
        drop(w);

        // Two read mappings coexist.
        let r1 = AccessScope::open(&b, AccessMode::Read).unwrap();
        let r2 = AccessScope::open(&b, AccessMode::Read).unwrap();
        assert_eq!(stats(&b).live, 2);
        drop((r1, r2));
        assert_eq!(stats(&b).live, 0);
    }

    #[test]
    fn test_mapping_stats_under_concurrent_release() {
        let dev = device();
        let b = Buffer::<u8>::zeros(&dev, &[64]).unwrap();
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let b = b.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let scope = AccessScope::open(&b, AccessMode::Read).unwrap();
                        assert_eq!(scope.as_slice()[0], 0);
                    }
                })
            })
            .collect();
        // Snapshots taken while releases race must stay in bounds.
        while !readers.iter().all(|r| r.is_finished()) {
            assert!(b.mapping_stats().live <= 4);
        }
        for r in readers {
            r.join().unwrap();
        }
        let done = b.mapping_stats();
        assert_eq!((done.opened, done.released, done.live), (2000, 2000, 0));
    }

    // Descriptors and adapters

    fn check_round_trip<T: Element>(dev: &Device) {
        let b = Buffer::<T>::zeros(dev, &[5, 7, 3]).unwrap();
        let bd = describe(&b).unwrap();
        assert_eq!(bd.depth, T::DEPTH);
        assert_eq!(bd.bits() as usize, std::mem::size_of::<T>() * 8);
        assert_eq!(bd.size, Size::new(7, 5));
        assert_eq!(bd.chan, 3);
        assert!(!bd.planar);

        let adapter = BufferAdapter::new(b.clone()).unwrap();
        let md = adapter.desc();
        assert_eq!(md.depth, T::DEPTH);
        assert_eq!(md.size, bd.size);
        assert_eq!(md.chan, bd.chan);
        assert_eq!(md.to_buffer_range().unwrap(), [5, 7, 3]);
    }

    #[test]
    fn test_descriptor_round_trip_all_depths() {
        let dev = device();
        check_round_trip::<u8>(&dev);
        check_round_trip::<i8>(&dev);
        check_round_trip::<u16>(&dev);
        check_round_trip::<i16>(&dev);
        check_round_trip::<i32>(&dev);
        check_round_trip::<f32>(&dev);
        check_round_trip::<f64>(&dev);
    }

    #[test]
    fn test_describe_requires_channel_dim() {
        let dev = device();
        let b = Buffer::<u8>::zeros(&dev, &[16, 16]).unwrap();
        let err = describe(&b).unwrap_err();
        assert!(matches!(err, Error::Dimensionality { .. }));
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(BufferAdapter::new(b).is_err());
    }

    #[test]
    fn test_adapter_view_aliases_device_memory() {
        let dev = device();
        let b = Buffer::<u8>::zeros(&dev, &[2, 3, 1]).unwrap();
        let adapter = BufferAdapter::new(b.clone()).unwrap();
        {
            let mut view = adapter.access(Access::W).unwrap();
            assert_eq!(view.step(), 3);
            view.row_mut::<u8>(1).unwrap().copy_from_slice(&[7, 8, 9]);
            assert_eq!(b.mapping_stats().live, 1);
        }
        assert_eq!(b.mapping_stats().live, 0);
        assert_eq!(b.to_vec().unwrap(), vec![0, 0, 0, 7, 8, 9]);

        let view = adapter.access(Access::R).unwrap();
        assert_eq!(view.as_slice::<u8>().unwrap(), &[0, 0, 0, 7, 8, 9]);
        assert!(view.as_slice::<i8>().is_err());
    }

    #[test]
    fn test_custom_desc_policy() {
        let dev = device();
        let b = Buffer::<f32>::zeros(&dev, &[4, 2, 1]).unwrap();
        let policy: DescPolicy = Arc::new(|d: &BufferDescriptor| {
            MatrixDescriptor::new(d.depth, d.chan, d.size).as_planar()
        });
        let adapter =
            BufferAdapter::with_policies(b, policy, islet_core::default_data_policy()).unwrap();
        assert!(adapter.desc().planar);
        assert_eq!(adapter.buffer_desc().size, Size::new(2, 4));
    }

    #[test]
    fn test_any_buffer_rmat_round_trip() {
        let dev = device();
        let any = AnyBuffer::zeros(&dev, islet_core::Depth::S16, &[3, 3, 2]).unwrap();
        let id = any.id();
        let mat = any.into_rmat().unwrap();
        assert_eq!(mat.desc().chan, 2);
        let back = AnyBuffer::from_rmat(&mat).unwrap();
        assert_eq!(back.id(), id);
        assert!(matches!(back, AnyBuffer::S16(_)));
        assert!(mat.get::<BufferAdapter<i16>>().is_some());
        assert!(mat.get::<BufferAdapter<u16>>().is_none());
    }

    // Pool

    #[test]
    fn test_reclaimed_storage_is_reused_zeroed() {
        let dev = device();
        let b = Buffer::<u8>::zeros(&dev, &[4, 4, 1]).unwrap();
        b.fill(77.0).unwrap();
        dev.wait().unwrap();
        assert!(dev.reclaim(b));
        assert_eq!(dev.pool_stats().cached_buffers, 1);

        let again = Buffer::<u8>::zeros(&dev, &[16]).unwrap();
        assert_eq!(dev.pool_stats().hits, 1);
        assert_eq!(again.to_vec().unwrap(), vec![0; 16]);
    }

    #[test]
    fn test_shared_buffer_not_reclaimed() {
        let dev = device();
        let b = Buffer::<f32>::zeros(&dev, &[8]).unwrap();
        let keep = b.clone();
        assert!(!dev.reclaim(b));
        assert_eq!(dev.pool_stats().cached_buffers, 0);
        assert_eq!(keep.len(), 8);

        assert!(dev.reclaim_any(AnyBuffer::from(keep)));
        dev.empty_cache();
        assert_eq!(dev.pool_stats().cached_bytes, 0);
    }

    #[test]
    fn test_pool_disabled() {
        let dev = Device::new(DeviceConfig::default().with_name("nopool").with_pool(false)).unwrap();
        assert_eq!(dev.name(), "nopool");
        let b = Buffer::<i8>::zeros(&dev, &[4]).unwrap();
        assert!(!dev.reclaim(b));
        let _ = Buffer::<i8>::zeros(&dev, &[4]).unwrap();
        assert_eq!(dev.pool_stats().hits + dev.pool_stats().misses, 0);
    }
}
