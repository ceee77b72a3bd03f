//! The fixed, ordered stage lists driving each lifecycle variant.
//!
//! Stages execute strictly sequentially; the first failure aborts the rest.
//! The driver lives on [`RenderEngine`](super::RenderEngine).

use crate::domain::page::PageKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    SetContentType,
    WriteDebugComments,
    WriteHead,
    StartBody,
    WriteBody,
    WriteResponseData,
    LateArrivals,
    CloseBody,
    Finish,
}

impl Stage {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Stage::SetContentType => "set_content_type",
            Stage::WriteDebugComments => "write_debug_comments",
            Stage::WriteHead => "write_head",
            Stage::StartBody => "start_body",
            Stage::WriteBody => "write_body",
            Stage::WriteResponseData => "write_response_data",
            Stage::LateArrivals => "late_arrivals",
            Stage::CloseBody => "close_body",
            Stage::Finish => "finish",
        }
    }
}

/// Select the stage list for a page. Evaluated once, before any stage runs.
pub(crate) fn stages_for(kind: PageKind) -> &'static [Stage] {
    match kind {
        PageKind::Raw => &[
            Stage::SetContentType,
            Stage::WriteResponseData,
            Stage::Finish,
        ],
        PageKind::Fragment => &[
            Stage::SetContentType,
            Stage::WriteDebugComments,
            Stage::WriteBody,
            Stage::Finish,
        ],
        PageKind::Document => &[
            Stage::SetContentType,
            Stage::WriteHead,
            Stage::StartBody,
            Stage::WriteBody,
            Stage::LateArrivals,
            Stage::CloseBody,
            Stage::Finish,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lifecycle_orders_body_between_head_and_late_arrivals() {
        let stages = stages_for(PageKind::Document);
        let body = stages.iter().position(|s| *s == Stage::WriteBody).unwrap();
        let head = stages.iter().position(|s| *s == Stage::WriteHead).unwrap();
        let late = stages
            .iter()
            .position(|s| *s == Stage::LateArrivals)
            .unwrap();
        let close = stages.iter().position(|s| *s == Stage::CloseBody).unwrap();
        assert!(head < body && body < late && late < close);
        assert_eq!(stages.last(), Some(&Stage::Finish));
    }

    #[test]
    fn fragment_lifecycle_skips_document_wrapper() {
        let stages = stages_for(PageKind::Fragment);
        assert!(!stages.contains(&Stage::WriteHead));
        assert!(!stages.contains(&Stage::LateArrivals));
        assert!(!stages.contains(&Stage::CloseBody));
        assert!(stages.contains(&Stage::WriteBody));
    }

    #[test]
    fn raw_lifecycle_only_writes_the_payload() {
        assert_eq!(
            stages_for(PageKind::Raw),
            &[
                Stage::SetContentType,
                Stage::WriteResponseData,
                Stage::Finish,
            ],
        );
    }
}
