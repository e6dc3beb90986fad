//! Text document related LSP methods.

mod completion;
mod completion_resolve;
mod definition;
mod diagnostic;
mod document_highlight;
mod hover;
mod linked_editing_range;
mod on_type_formatting;
mod references;
mod rename;

// The methods are implemented as impl blocks on RazorRouter
