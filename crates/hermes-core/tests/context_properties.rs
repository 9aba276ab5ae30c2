//! Property tests for the execution context.

use hermes_core::{ExecutionContext, ExecutionFailure};
use hermes_router::Params;
use http::StatusCode;
use proptest::prelude::*;

proptest! {
    #[test]
    fn interrupt_with_renders_failure_status(code in 400u16..600) {
        let status = StatusCode::from_u16(code).unwrap();
        let mut ctx = ExecutionContext::builder().build();

        ctx.interrupt_with(ExecutionFailure::new(status));

        prop_assert!(ctx.is_interrupted());
        prop_assert_eq!(ctx.response().status(), status);
        prop_assert_eq!(ctx.failure().map(ExecutionFailure::status), Some(status));
    }

    #[test]
    fn merged_parameters_keep_first_binding(
        bindings in proptest::collection::vec(("[a-c]", "[0-9]{1,3}"), 0..12)
    ) {
        let mut ctx = ExecutionContext::builder().build();
        for (name, value) in &bindings {
            let mut params = Params::new();
            params.push(name.as_str(), value.as_str());
            ctx.merge_path_parameters(&params);
        }

        for (name, _) in &bindings {
            let first = bindings
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str());
            prop_assert_eq!(ctx.path_parameters().get(name), first);
        }
    }
}
