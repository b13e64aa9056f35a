use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lrcp_frame::{SessionId, MAX_INT};
use lrcp_session::{Client, SessionConfig, SessionError};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_exchange, Exchange, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let retransmit = parse_duration(&args.retransmit)?;
    let config = SessionConfig::default()
        .with_retransmit_interval(retransmit)
        .with_connect_timeout(wait_timeout);

    let session = args.session.unwrap_or_else(default_session_id);
    let payload = line_payload(&args.data);
    let lines = payload.matches('\n').count();

    let client = Client::connect(args.addr, session, config)
        .map_err(|err| session_error("connect failed", err))?;
    client
        .send(payload.as_bytes())
        .map_err(|err| session_error("send failed", err))?;

    let replies = collect_replies(&client, lines, wait_timeout)
        .map_err(|err| session_error("receive failed", err))?;
    let exchange = Exchange {
        server: client.server(),
        session: client.id(),
        sent: payload,
        replies,
        stats: client.stats(),
    };
    client.close();

    print_exchange(&exchange, format);
    Ok(SUCCESS)
}

fn line_payload(data: &str) -> String {
    let mut payload = data.to_string();
    if !payload.ends_with('\n') {
        payload.push('\n');
    }
    payload
}

fn default_session_id() -> SessionId {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    (std::process::id() ^ nanos) & MAX_INT
}

trait LineSource {
    fn next_line(&self, timeout: Duration) -> Result<String, SessionError>;
}

impl LineSource for Client {
    fn next_line(&self, timeout: Duration) -> Result<String, SessionError> {
        self.read_line(timeout)
    }
}

/// Read `lines` replies, all within one shared `timeout`.
fn collect_replies<S: LineSource>(
    source: &S,
    lines: usize,
    timeout: Duration,
) -> Result<Vec<String>, SessionError> {
    let deadline = Instant::now() + timeout;
    let mut replies = Vec::with_capacity(lines);
    for _ in 0..lines {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match source.next_line(remaining) {
            Ok(line) => replies.push(line),
            Err(SessionError::Timeout(_)) => return Err(SessionError::Timeout(timeout)),
            Err(err) => return Err(err),
        }
    }
    Ok(replies)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    struct MockSource {
        lines: RefCell<VecDeque<Result<String, SessionError>>>,
        budgets: RefCell<Vec<Duration>>,
    }

    impl MockSource {
        fn new(lines: Vec<Result<String, SessionError>>) -> Self {
            Self {
                lines: RefCell::new(lines.into()),
                budgets: RefCell::new(Vec::new()),
            }
        }
    }

    impl LineSource for MockSource {
        fn next_line(&self, timeout: Duration) -> Result<String, SessionError> {
            self.budgets.borrow_mut().push(timeout);
            self.lines
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(SessionError::Timeout(timeout)))
        }
    }

    #[test]
    fn collects_requested_number_of_lines() {
        let source = MockSource::new(vec![Ok("olleh".into()), Ok("dlrow".into()), Ok("x".into())]);
        let replies = collect_replies(&source, 2, Duration::from_secs(5)).unwrap();

        assert_eq!(replies, vec!["olleh", "dlrow"]);
        let budgets = source.budgets.borrow();
        assert!(budgets[1] <= budgets[0]);
    }

    #[test]
    fn timeout_reports_whole_budget() {
        let source = MockSource::new(vec![Ok("olleh".into())]);
        let err = collect_replies(&source, 2, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, SessionError::Timeout(t) if t == Duration::from_secs(5)));
    }

    #[test]
    fn closed_session_is_reported() {
        let source = MockSource::new(vec![Err(SessionError::Closed(4))]);
        let err = collect_replies(&source, 1, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SessionError::Closed(4)));
    }

    #[test]
    fn payload_gets_trailing_newline() {
        assert_eq!(line_payload("hello"), "hello\n");
        assert_eq!(line_payload("a\nb\n"), "a\nb\n");
        assert_eq!(line_payload("a\nb").matches('\n').count(), 2);
    }

    #[test]
    fn default_session_id_is_encodable() {
        assert!(default_session_id() <= MAX_INT);
    }
}
