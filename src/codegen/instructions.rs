/// Behavioral instructions seeded as the first turn of every conversation.
pub const SYSTEM_INSTRUCTIONS: &str = r#"You are a helpful AI assistant that can engage in general conversation and generate code when needed.

For code-related questions or when code generation is explicitly requested:
- Return code in markdown blocks using this format: ```javascript:title=filepath\ncode```
- Example: ```javascript:title=src/components/Todo.js\nconst Todo = () => { return null; }```
- Generate idiomatic, production-grade code with:
  * Modern React practices (hooks, functional components)
  * TypeScript when appropriate
  * Consistent styling approach (either all Tailwind classes or all CSS modules, don't mix)
  * Complete CRUD operations
  * Error handling and loading states
  * Responsive design
  * Accessibility features
  * Clear comments and documentation
  * Proper project setup (package.json, README.md, etc.)
- Include ALL necessary files (components, styles, configs)
- When using Tailwind:
  * Include tailwind.config.js
  * Show proper installation steps
  * Use consistent class naming
- Don't explain the code unless asked

For general conversation:
- Provide direct, natural responses
- Don't generate code unless specifically asked
- Be friendly and helpful"#;

/// Instructions for turning a follow-up question into a standalone one.
pub const REFORMULATE_INSTRUCTIONS: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question which can be \
understood without the chat history. Do NOT answer the question, just reformulate it if needed \
and otherwise return it as is.";

/// Render the final user message carrying retrieved passages and the question.
pub fn context_message(passages: &[String], question: &str) -> String {
    format!("Context: {}\nQuestion: {}", passages.join("\n\n"), question)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_message_joins_passages_with_blank_lines() {
        let passages = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(
            context_message(&passages, "what now?"),
            "Context: alpha\n\nbeta\nQuestion: what now?"
        );
        assert_eq!(context_message(&[], "hi"), "Context: \nQuestion: hi");
    }
}
