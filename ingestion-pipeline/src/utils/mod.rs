pub mod html_extraction;
pub mod images;
pub mod llm_instructions;
