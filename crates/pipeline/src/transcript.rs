//! Ordered, human-readable transcript of one submission.
//!
//! Gateway messages and process output share one stream. Messages are
//! written to the live sink and the retained text together; process output
//! reaches the sink through the command runner while it is produced, so it
//! is only appended to the retained text once the process has finished.

use pau_core::scripting::OutputSink;

#[derive(Debug)]
pub struct Transcript {
    text: String,
    sink: OutputSink,
}

impl Transcript {
    pub fn new(sink: OutputSink) -> Self {
        Self {
            text: String::new(),
            sink,
        }
    }

    /// The live sink, for handing to a command runner.
    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    /// Write a gateway message as one line.
    pub fn line(&mut self, message: impl AsRef<str>) {
        let mut line = message.as_ref().to_string();
        line.push('\n');
        self.sink.emit(line.as_str());
        self.text.push_str(&line);
    }

    /// Retain output that a runner has already streamed to the sink.
    ///
    /// A trailing newline is added (to both) when the output lacks one, so
    /// the next message starts on its own line.
    pub fn streamed_output(&mut self, output: &str) {
        self.text.push_str(output);
        if !output.is_empty() && !output.ends_with('\n') {
            self.sink.emit("\n");
            self.text.push('\n');
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_and_text_stay_in_step() {
        let (sink, mut rx) = OutputSink::channel();
        let mut transcript = Transcript::new(sink);

        transcript.line("outfile: /r/x.ini");
        transcript.sink().emit("writer says hi");
        transcript.streamed_output("writer says hi");
        transcript.line("done");

        let text = transcript.into_text();
        let mut streamed = String::new();
        while let Ok(chunk) = rx.try_recv() {
            streamed.push_str(&chunk);
        }
        assert_eq!(text, "outfile: /r/x.ini\nwriter says hi\ndone\n");
        assert_eq!(streamed, text);
    }

    #[test]
    fn empty_output_adds_nothing() {
        let mut transcript = Transcript::new(OutputSink::discard());
        transcript.streamed_output("");
        assert_eq!(transcript.text(), "");
    }
}
