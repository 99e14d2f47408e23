/// Selects the stack frames worth showing in an alert.
///
/// A frame is kept when its symbol line or one of its `at` location lines
/// contains any marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrameFilter {
    markers: Vec<String>,
}

impl StackFrameFilter {
    pub fn new(markers: Vec<String>) -> Self {
        Self { markers }
    }

    pub fn is_business_line(&self, line: &str) -> bool {
        self.markers.iter().any(|m| line.contains(m.as_str()))
    }

    /// Business-relevant frames of a `std::backtrace::Backtrace` rendering,
    /// one entry per frame as `symbol (location)`.
    pub fn business_frames(&self, backtrace: &str) -> Vec<String> {
        parse_frames(backtrace)
            .into_iter()
            .filter(|frame| {
                self.is_business_line(&frame.symbol)
                    || frame.locations.iter().any(|l| self.is_business_line(l))
            })
            .map(|frame| match frame.locations.first() {
                Some(location) => format!("{} ({})", frame.symbol, location),
                None => frame.symbol,
            })
            .collect()
    }
}

struct Frame {
    symbol: String,
    locations: Vec<String>,
}

fn parse_frames(backtrace: &str) -> Vec<Frame> {
    let mut frames: Vec<Frame> = Vec::new();
    for line in backtrace.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                frame.locations.push(location.trim().to_string());
            }
            continue;
        }
        let symbol = match line.split_once(':') {
            Some((index, rest)) if index.trim().parse::<u32>().is_ok() => rest.trim(),
            _ => line,
        };
        frames.push(Frame {
            symbol: symbol.to_string(),
            locations: Vec::new(),
        });
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = "   0: std::backtrace::Backtrace::force_capture
             at /rustc/abc/library/std/src/backtrace.rs:312:13
   1: scout_batch::recovery::panic_capture::install_panic_hook::{{closure}}
             at ./src/recovery/panic_capture.rs:40:28
   2: std::panicking::rust_panic_with_hook
   3: scout_batch::background_jobs::jobs::scout_entry_ingest::ingest_provider::{{closure}}
             at ./src/background_jobs/jobs/scout_entry_ingest.rs:57:9
   4: <core::pin::Pin<P> as core::future::future::Future>::poll
             at /rustc/abc/library/core/src/future/future.rs:123:9
   5: tokio::runtime::task::harness::poll_future
";

    fn filter() -> StackFrameFilter {
        StackFrameFilter::new(vec![
            "scout_batch::background_jobs::jobs".to_string(),
            "src/server/api_routes.rs".to_string(),
        ])
    }

    #[test]
    fn keeps_only_marked_frames() {
        let frames = filter().business_frames(TRACE);

        assert_eq!(
            frames,
            vec![
                "scout_batch::background_jobs::jobs::scout_entry_ingest::ingest_provider::{{closure}} \
                 (./src/background_jobs/jobs/scout_entry_ingest.rs:57:9)"
                    .to_string()
            ]
        );
    }

    #[test]
    fn location_line_alone_is_enough() {
        let trace = "  7: <inlined>\n         at ./src/server/api_routes.rs:20:5\n";
        let frames = filter().business_frames(trace);
        assert_eq!(frames, vec!["<inlined> (./src/server/api_routes.rs:20:5)"]);
    }

    #[test]
    fn empty_markers_keep_nothing() {
        let filter = StackFrameFilter::new(vec![]);
        assert!(filter.business_frames(TRACE).is_empty());
    }
}
