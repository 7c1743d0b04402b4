use crate::{error::VarannoError, utils::util::Result};
use std::{any::Any, thread};

fn panic_payload_message(panic_payload: &(dyn Any + Send + 'static)) -> String {
    if let Some(message) = panic_payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = panic_payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_owned()
}

fn join_thread_result(thread_name: &str, handle: thread::JoinHandle<Result<()>>) -> Result<()> {
    joined_outcome(thread_name, handle.join())
}

fn joined_outcome(thread_name: &str, joined: thread::Result<Result<()>>) -> Result<()> {
    match joined {
        Ok(result) => result.map_err(|e| crate::varanno_error!("{thread_name} thread failed: {e}")),
        Err(panic_payload) => Err(crate::varanno_error!(
            "{thread_name} thread panicked: {}",
            panic_payload_message(panic_payload.as_ref())
        )),
    }
}

fn aggregate_shutdown_errors(errors: Vec<VarannoError>) -> Result<()> {
    let mut errors = errors.into_iter();
    let (first, second) = (errors.next(), errors.next());
    match (first, second) {
        (None, _) => Ok(()),
        (Some(error), None) => Err(error),
        (Some(first), Some(second)) => {
            let summary = [first, second]
                .into_iter()
                .chain(errors)
                .enumerate()
                .map(|(index, error)| format!("{}. {}", index + 1, error))
                .collect::<Vec<_>>()
                .join("; ");
            Err(crate::varanno_error!(
                "Multiple thread shutdown errors: {summary}"
            ))
        }
    }
}

/// Joins the reader thread and folds its outcome with the main thread's.
///
/// The reader's receiver must already be dropped, so a reader blocked on a
/// full channel exits instead of deadlocking the join. That disconnect is a
/// consequence of a main-thread failure and is not reported on its own.
pub(crate) fn finalize_annotate_threads(
    reader_thread: thread::JoinHandle<Result<()>>,
    main_result: Result<()>,
) -> Result<()> {
    let mut errors = Vec::new();
    let main_failed = main_result.is_err();

    if let Err(error) = main_result {
        errors.push(error);
    }
    match reader_thread.join() {
        Ok(Err(VarannoError::ReceiverClosed { .. })) if main_failed => {
            log::debug!("Reader thread stopped after the main thread failed.")
        }
        joined => match joined_outcome("Reader", joined) {
            Ok(()) => log::debug!("Reader thread joined successfully."),
            Err(error) => errors.push(error),
        },
    }

    aggregate_shutdown_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_shutdown_errors() {
        assert!(aggregate_shutdown_errors(Vec::new()).is_ok());

        let single = aggregate_shutdown_errors(vec![crate::varanno_error!("boom")]).unwrap_err();
        assert_eq!(single.to_string(), "boom");

        let multiple = aggregate_shutdown_errors(vec![
            crate::varanno_error!("first"),
            crate::varanno_error!("second"),
            crate::varanno_error!("third"),
        ])
        .unwrap_err();
        assert_eq!(
            multiple.to_string(),
            "Multiple thread shutdown errors: 1. first; 2. second; 3. third"
        );
    }

    #[test]
    fn test_join_reports_failures_and_panics() {
        let failed = thread::spawn(|| -> Result<()> { Err(crate::varanno_error!("bad input")) });
        let err = join_thread_result("Reader", failed).unwrap_err();
        assert_eq!(err.to_string(), "Reader thread failed: bad input");

        let panicked = thread::spawn(|| -> Result<()> { panic!("exploded") });
        let err = join_thread_result("Reader", panicked).unwrap_err();
        assert_eq!(err.to_string(), "Reader thread panicked: exploded");
    }

    #[test]
    fn test_finalize_keeps_main_error_first() {
        let reader = thread::spawn(|| -> Result<()> { Err(crate::varanno_error!("reader")) });
        let err = finalize_annotate_threads(reader, Err(crate::varanno_error!("writer")))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Multiple thread shutdown errors: 1. writer; 2. Reader thread failed: reader"
        );
    }

    #[test]
    fn test_finalize_drops_disconnect_after_main_failure() {
        let reader = thread::spawn(|| -> Result<()> {
            Err(VarannoError::ReceiverClosed { thread: "reader" })
        });
        let err = finalize_annotate_threads(reader, Err(crate::varanno_error!("disk full")))
            .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_finalize_reports_disconnect_without_main_failure() {
        let reader = thread::spawn(|| -> Result<()> {
            Err(VarannoError::ReceiverClosed { thread: "reader" })
        });
        let err = finalize_annotate_threads(reader, Ok(())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Reader thread failed: Channel receiver closed unexpectedly in reader thread"
        );
    }
}
