use ayah_player::state::Snapshot;
use ayah_player::PlayerHandle;

/// Whether the session is over: the audio ended, or a repeat range ran out
/// and playback paused.
fn finished(snap: &Snapshot, had_repeat: bool) -> bool {
    snap.state == "ready.ended" || (had_repeat && snap.repeat.is_none() && snap.state == "ready.paused")
}

/// Print the active verse key to stdout each time it changes (for scripting).
pub async fn display_verses_pipe(
    handle: &PlayerHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut rx = handle.subscribe();
    let mut last_verse = None;
    let mut had_repeat = false;

    loop {
        let snap = rx.borrow_and_update().clone();
        if let Some(failure) = snap.failure {
            return Err(failure.into());
        }
        if let Some(err) = &snap.error {
            eprintln!("{err}");
        }
        had_repeat |= snap.repeat.is_some();

        if let Some(verse) = snap.verse
            && last_verse != Some(verse)
        {
            match snap.word {
                Some(word) => println!("{verse} (word {})", word.word),
                None => println!("{verse}"),
            }
            last_verse = Some(verse);
        }
        if finished(&snap, had_repeat) {
            return Ok(());
        }
        if rx.changed().await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayah_player::repeat::RepeatProgress;

    #[test]
    fn stops_on_end_or_exhausted_repeat() {
        let ended = Snapshot { state: "ready.ended", ..Default::default() };
        assert!(finished(&ended, false));

        let paused = Snapshot { state: "ready.paused", ..Default::default() };
        assert!(!finished(&paused, false));
        assert!(finished(&paused, true));

        let repeating = Snapshot {
            state: "ready.paused",
            repeat: Some(RepeatProgress { repeat_each_verse: 1, repeat_range: 1 }),
            ..Default::default()
        };
        assert!(!finished(&repeating, true));
    }
}
