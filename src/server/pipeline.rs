//! Interceptor pipeline composition.
//!
//! The order of the interceptors is fixed and checked when the pipeline is
//! built:
//!
//! ```text
//!  client ──► HostRewrite ──► PathRewrite ──► downstream
//!                                                │
//!  client ◄────────────── ResponseRewrite ◄──────┘
//! ```
//!
//! `HostRewrite` must see the request before the downstream server builds any
//! links. `PathRewrite` must produce the final path and query. The response
//! rewriter wraps everything else so it post-processes the response after
//! every inner stage has returned, and inspects the client's original method
//! and path.
//!
//! Stages run before routing in the wrapped downstream service, so rewritten
//! paths are what downstream routing sees.

use std::fmt;

use axum::{middleware, Router};

use crate::error::PipelineError;
use crate::rewrite::{
    host_rewrite_middleware, path_rewrite_middleware, tilejson_rewrite_middleware, HostRewrite,
    PathRewrite, TileJsonRewrite,
};

/// One interceptor of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    HostRewrite,
    PathRewrite,
    ResponseRewrite,
}

impl Stage {
    /// The only valid ordering.
    pub const ORDER: [Stage; 3] = [Stage::HostRewrite, Stage::PathRewrite, Stage::ResponseRewrite];

    pub fn name(self) -> &'static str {
        match self {
            Stage::HostRewrite => "host_rewrite",
            Stage::PathRewrite => "path_rewrite",
            Stage::ResponseRewrite => "response_rewrite",
        }
    }

    /// Whether this stage only acts on responses.
    pub fn is_outbound(self) -> bool {
        matches!(self, Stage::ResponseRewrite)
    }

    fn rank(self) -> usize {
        match self {
            Stage::HostRewrite => 0,
            Stage::PathRewrite => 1,
            Stage::ResponseRewrite => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An ordered, validated chain of interceptors.
///
/// There is no way to add, remove or reorder stages after construction.
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    host: HostRewrite,
    path: PathRewrite,
    tilejson: TileJsonRewrite,
}

impl Pipeline {
    /// Build a pipeline from an explicit stage list.
    ///
    /// Fails if a stage is duplicated, missing, or out of order.
    pub fn new(
        stages: Vec<Stage>,
        host: HostRewrite,
        path: PathRewrite,
        tilejson: TileJsonRewrite,
    ) -> Result<Self, PipelineError> {
        validate_order(&stages)?;
        Ok(Self {
            stages,
            host,
            path,
            tilejson,
        })
    }

    /// Build the pipeline with the canonical stage order.
    pub fn standard(host: HostRewrite, path: PathRewrite, tilejson: TileJsonRewrite) -> Self {
        Self {
            stages: Stage::ORDER.to_vec(),
            host,
            path,
            tilejson,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Wrap a downstream service with every stage.
    ///
    /// Inbound stages are applied innermost-last so the first listed stage
    /// sees the request first; outbound stages wrap the result.
    pub fn wrap(&self, downstream: Router) -> Router {
        let inbound = self.stages.iter().filter(|s| !s.is_outbound()).rev();
        let outbound = self.stages.iter().filter(|s| s.is_outbound());

        inbound
            .chain(outbound)
            .fold(downstream, |inner, stage| self.apply(*stage, inner))
    }

    /// Put one stage in front of `inner`.
    ///
    /// `inner` becomes the fallback of a fresh router so the middleware runs
    /// before `inner` routes the request.
    fn apply(&self, stage: Stage, inner: Router) -> Router {
        let router = Router::new().fallback_service(inner);
        match stage {
            Stage::HostRewrite => router.layer(middleware::from_fn_with_state(
                self.host.clone(),
                host_rewrite_middleware,
            )),
            Stage::PathRewrite => router.layer(middleware::from_fn_with_state(
                self.path.clone(),
                path_rewrite_middleware,
            )),
            Stage::ResponseRewrite => router.layer(middleware::from_fn_with_state(
                self.tilejson.clone(),
                tilejson_rewrite_middleware,
            )),
        }
    }
}

fn validate_order(stages: &[Stage]) -> Result<(), PipelineError> {
    for (i, stage) in stages.iter().enumerate() {
        if stages[..i].contains(stage) {
            return Err(PipelineError::DuplicateStage(stage.name()));
        }
    }

    for required in Stage::ORDER {
        if !stages.contains(&required) {
            return Err(PipelineError::MissingStage(required.name()));
        }
    }

    for pair in stages.windows(2) {
        if pair[1].rank() < pair[0].rank() {
            return Err(PipelineError::OutOfOrder {
                stage: pair[0].name(),
                after: pair[1].name(),
            });
        }
    }

    Ok(())
}
