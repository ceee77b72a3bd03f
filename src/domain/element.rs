//! Render units: the ordered, independently-resolving pieces of a page body.

use futures::future::BoxFuture;

use super::page::PageComponent;

/// Opaque failure from a component's data source.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// A lazy component: resolves when its data is ready, or fails.
pub type ComponentFuture = BoxFuture<'static, Result<Box<dyn PageComponent>, SourceError>>;

/// One entry in a page's declared element list, as authored.
pub enum ElementSpec {
    /// A component whose data is already available.
    Ready(Box<dyn PageComponent>),
    /// A component still waiting on data.
    Deferred(ComponentFuture),
    /// Structural container open; carries caller-supplied attributes and is
    /// written immediately, without timing metadata.
    ContainerOpen(Vec<(String, String)>),
    /// Structural container close.
    ContainerClose,
}

/// A standardized, index-stamped unit ready for the completion buffer.
/// Consumed exactly once.
pub struct RenderUnit {
    pub index: usize,
    pub source: UnitSource,
}

pub enum UnitSource {
    Component(ComponentFuture),
    ContainerOpen(Vec<(String, String)>),
    ContainerClose,
}

/// Standardize the page's element list into indexed render units. The index
/// assigned here defines the total write order for the response.
pub fn standardize_elements(specs: Vec<ElementSpec>) -> Vec<RenderUnit> {
    specs
        .into_iter()
        .enumerate()
        .map(|(index, spec)| RenderUnit {
            index,
            source: match spec {
                ElementSpec::Ready(component) => {
                    UnitSource::Component(Box::pin(async move { Ok(component) }))
                }
                ElementSpec::Deferred(future) => UnitSource::Component(future),
                ElementSpec::ContainerOpen(attrs) => UnitSource::ContainerOpen(attrs),
                ElementSpec::ContainerClose => UnitSource::ContainerClose,
            },
        })
        .collect()
}
