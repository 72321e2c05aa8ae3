// Backend registry tests: registration, lookup and compilation through
// trait objects

#[cfg(test)]
mod tests {
    use islet::{
        BackendRegistry, DeviceBackend, Error, ErrorKind, Graph, IslandBackend, IslandConfig,
        IslandExecutable, Meta, NodeId, Result, Value,
    };
    use islet_core::Scalar;
    use islet_device::{Device, DeviceConfig};

    /// A backend that compiles nothing, to check the registry stays generic.
    struct NullBackend(&'static str);

    struct NullExecutable;

    impl IslandExecutable for NullExecutable {
        fn can_reshape(&self) -> bool {
            true
        }

        fn reshape(&mut self, _graph: &Graph) -> Result<()> {
            Ok(())
        }

        fn run<'a>(
            &mut self,
            _inputs: &[(NodeId, &'a Value)],
            _outputs: Vec<(NodeId, &'a mut Value)>,
        ) -> Result<()> {
            Ok(())
        }
    }

    impl IslandBackend for NullBackend {
        fn name(&self) -> &str {
            self.0
        }

        fn compile(&self, _graph: &Graph, _nodes: &[NodeId]) -> Result<Box<dyn IslandExecutable>> {
            Ok(Box::new(NullExecutable))
        }
    }

    /// `out = k * 2` on scalars.
    fn doubling_island() -> (Graph, Vec<NodeId>, NodeId, NodeId) {
        let mut g = Graph::new();
        let k = g.input("k", Meta::Scalar);
        let out = g.output("out", Meta::Scalar);
        let double = DeviceBackend::kernel("double", |ctx| {
            let k = ctx.input_scalar(0)?[0];
            ctx.output_scalar(0)?[0] = k * 2.0;
            Ok(())
        });
        let op = g.add_op("double", double, vec![k.into()], vec![out]);
        (g, vec![k, out, op], k, out)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = BackendRegistry::new();
        assert!(registry.is_empty());

        let device = Device::default_device().unwrap();
        DeviceBackend::new(device).register(&mut registry).unwrap();
        registry.register(Box::new(NullBackend("null"))).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec![DeviceBackend::NAME, "null"]);
        assert_eq!(registry.get("null").map(|b| b.name()), Some("null"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = BackendRegistry::new();
        registry.register(Box::new(NullBackend("null"))).unwrap();
        let err = registry
            .register(Box::new(NullBackend("null")))
            .unwrap_err();
        assert!(matches!(err, Error::Msg(_)));
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_compile_and_run_through_registry() {
        let device = Device::new(DeviceConfig::new().with_name("registry-test")).unwrap();
        let mut registry = BackendRegistry::new();
        DeviceBackend::new(device).register(&mut registry).unwrap();

        let (g, nodes, k, out) = doubling_island();
        let mut exe = registry.compile(DeviceBackend::NAME, &g, &nodes).unwrap();
        assert!(!exe.can_reshape());
        assert!(matches!(
            exe.reshape(&g),
            Err(Error::ReshapeUnsupported { .. })
        ));

        for v in [1.0, -4.5] {
            let input = Value::Scalar(Scalar::new(v));
            let mut result = Value::Empty;
            exe.run(&[(k, &input)], vec![(out, &mut result)]).unwrap();
            assert_eq!(result.as_scalar().map(|s| s[0]), Some(v * 2.0));
        }
    }

    #[test]
    fn test_compile_errors() {
        let registry = BackendRegistry::new();
        let (g, nodes, _, _) = doubling_island();
        assert!(registry.compile("nope", &g, &nodes).is_err());

        let backend = DeviceBackend::with_config(
            Device::default_device().unwrap(),
            IslandConfig::default().with_output_checks(false),
        );
        assert!(!backend.config().check_output_metas);
        let err = match backend.compile(&g, &nodes[..2]) {
            Err(e) => e,
            Ok(_) => panic!("island without its operation compiled"),
        };
        assert_eq!(err.kind(), ErrorKind::Structural);
    }

    #[test]
    fn test_executables_are_independent() {
        let mut registry = BackendRegistry::new();
        DeviceBackend::new(Device::default_device().unwrap())
            .register(&mut registry)
            .unwrap();
        registry.register(Box::new(NullBackend("null"))).unwrap();

        let (g, nodes, k, out) = doubling_island();
        let mut device_exe = registry.compile(DeviceBackend::NAME, &g, &nodes).unwrap();
        let mut null_exe = registry.compile("null", &g, &nodes).unwrap();
        assert!(null_exe.can_reshape());

        let input = Value::Scalar(Scalar::new(3.0));
        let mut a = Value::Empty;
        let mut b = Value::Empty;
        device_exe.run(&[(k, &input)], vec![(out, &mut a)]).unwrap();
        null_exe.run(&[(k, &input)], vec![(out, &mut b)]).unwrap();
        assert_eq!(a.as_scalar().map(|s| s[0]), Some(6.0));
        assert!(b.is_empty());
    }
}
