use crate::log_entry::LogEntry;

pub const EMPTY_PLACEHOLDER: &str = ":-- No logs available...";

pub fn render_line(entry: &LogEntry) -> String {
    format!("> {} - {}", entry.timestamp(), entry.message())
}

pub fn render(snapshot: &[LogEntry]) -> Vec<String> {
    if snapshot.is_empty() {
        return vec![EMPTY_PLACEHOLDER.to_string()];
    }
    snapshot.iter().map(render_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let snapshot = vec![LogEntry::new("00:00:01", "boot"), LogEntry::new("00:00:02", "ready")];

        assert_eq!(
            render(&snapshot),
            vec!["> 00:00:01 - boot".to_string(), "> 00:00:02 - ready".to_string()]
        );
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), vec![EMPTY_PLACEHOLDER.to_string()]);
    }
}
