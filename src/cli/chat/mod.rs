pub mod files;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use color_print::cformat;
use eyre::Result;
use rustyline::{CompletionType, Config, Editor};
use tracing::error;

use crate::codegen::{ConversationOrchestrator, ConversationState, FileSet, GenerationResult};

const WELCOME_TEXT: &str = "
Hi, I'm your code generation assistant. Describe what you want to build.

Things to try
• Create a todo app in React with Tailwind.
• Add a dark mode toggle to it.
• Write a README for the project.

/help         Show the help dialogue
/quit         Quit the application
";

const PROMPT: &str = "codegen> ";

const HELP_TEXT: &str = "
Codegen Chat CLI

/clear        Start a new conversation
/files        List the files from the last answer
/help         Show this help dialogue
/quit         Quit the application
";

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    conversation_state: ConversationState,
    orchestrator: Arc<ConversationOrchestrator>,
    out_dir: Option<PathBuf>,
    last_files: FileSet,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        orchestrator: Arc<ConversationOrchestrator>,
        out_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            output,
            input,
            interactive,
            conversation_state: ConversationState::new(),
            orchestrator,
            out_dir,
            last_files: FileSet::new(),
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Handle non-interactive mode (single query)
        if let Some(input) = self.input.take() {
            self.handle_input(&input).await?;
            return Ok(ExitCode::SUCCESS);
        }

        if self.interactive {
            writeln!(self.output, "{}", WELCOME_TEXT)?;
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let config = Config::builder()
            .history_ignore_space(true)
            .history_ignore_dups(true)
            .completion_type(CompletionType::List)
            .build();
        let mut rl = Editor::<()>::with_config(config)?;

        loop {
            let readline = rl.readline(PROMPT);

            match readline {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    if line.trim() == "/quit" {
                        break;
                    }

                    if let Err(e) = self.handle_input(&line).await {
                        writeln!(self.output, "Error: {}", e)?;
                    }
                }
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> Result<()> {
        match input.trim() {
            "/help" => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            "/clear" => {
                self.conversation_state = ConversationState::new();
                self.last_files.clear();
                writeln!(self.output, "Conversation cleared.")?;
            }
            "/files" => {
                if self.last_files.is_empty() {
                    writeln!(self.output, "The last answer contained no files.")?;
                } else {
                    let files = self.last_files.clone();
                    self.print_file_summary(&files)?;
                }
            }
            _ => self.process_chat_input(input).await?,
        }

        Ok(())
    }

    async fn process_chat_input(&mut self, input: &str) -> Result<()> {
        let result = self
            .orchestrator
            .handle_turn(input, &mut self.conversation_state)
            .await?;
        self.display_result(&result)?;
        self.last_files = result.files;
        Ok(())
    }

    fn display_result(&mut self, result: &GenerationResult) -> Result<()> {
        writeln!(self.output, "{}", result.message)?;

        if result.files.is_empty() {
            return Ok(());
        }
        self.print_file_summary(&result.files)?;

        if let Some(out_dir) = self.out_dir.clone() {
            match files::write_files(&out_dir, &result.files) {
                Ok(written) => writeln!(
                    self.output,
                    "{}",
                    cformat!("<green>Wrote {} files to {}</green>", written.len(), out_dir.display())
                )?,
                Err(e) => {
                    error!("Failed to write files: {}", e);
                    writeln!(self.output, "Failed to write files: {}", e)?;
                }
            }
        }

        Ok(())
    }

    fn print_file_summary(&mut self, files: &FileSet) -> Result<()> {
        writeln!(self.output, "{}", cformat!("\n<bold>Files ({})</bold>", files.len()))?;
        for (path, content) in files {
            writeln!(
                self.output,
                "{}",
                cformat!("  <cyan>{}</cyan> ({} lines)", path, content.lines().count())
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::codegen::{ContextStore, Responder, RetrievalSettings, Turn};
    use crate::error::Result as CodegenResult;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct NoContext;

    #[async_trait]
    impl ContextStore for NoContext {
        async fn retrieve(&self, _query: &str, _k: usize, _diversity: f32) -> CodegenResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct TodoResponder;

    #[async_trait]
    impl Responder for TodoResponder {
        async fn reformulate(&self, question: &str, _history: &[Turn]) -> CodegenResult<String> {
            Ok(question.to_string())
        }

        async fn answer(
            &self,
            _system_instructions: &str,
            _context: &[String],
            _history: &[Turn],
            _question: &str,
        ) -> CodegenResult<String> {
            Ok("Done.\n```jsx:title=src/Todo.jsx\nexport const Todo = () => null;\n```".to_string())
        }
    }

    fn chat(buffer: &SharedBuffer, out_dir: Option<PathBuf>) -> ChatContext {
        let orchestrator = ConversationOrchestrator::new(
            Arc::new(NoContext),
            Arc::new(TodoResponder),
            RetrievalSettings::default(),
        )
        .unwrap();
        ChatContext::new(Box::new(buffer.clone()), None, false, Arc::new(orchestrator), out_dir)
    }

    #[tokio::test]
    async fn prompt_prints_message_and_file_summary() {
        let buffer = SharedBuffer::default();
        let mut chat = chat(&buffer, None);

        chat.handle_input("make a todo").await.unwrap();

        let output = buffer.contents();
        assert!(output.contains("Done."));
        assert!(output.contains("src/Todo.jsx"));
        assert_eq!(chat.conversation_state.len(), 3);
        assert_eq!(chat.last_files.len(), 1);
    }

    #[tokio::test]
    async fn clear_resets_the_conversation() {
        let buffer = SharedBuffer::default();
        let mut chat = chat(&buffer, None);

        chat.handle_input("make a todo").await.unwrap();
        chat.handle_input("/clear").await.unwrap();

        assert_eq!(chat.conversation_state.len(), 1);
        assert!(chat.last_files.is_empty());
        assert!(buffer.contents().contains("Conversation cleared."));
    }

    #[tokio::test]
    async fn files_are_written_to_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = SharedBuffer::default();
        let mut chat = chat(&buffer, Some(dir.path().to_path_buf()));

        chat.handle_input("make a todo").await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("src/Todo.jsx")).unwrap();
        assert_eq!(written, "export const Todo = () => null;");
    }

    #[tokio::test]
    async fn single_input_mode_runs_one_cycle() {
        let buffer = SharedBuffer::default();
        let mut chat = chat(&buffer, None);
        chat.input = Some("make a todo".to_string());

        chat.run().await.unwrap();

        assert!(chat.input.is_none());
        assert!(buffer.contents().contains("Done."));
    }
}
