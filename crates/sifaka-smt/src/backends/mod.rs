pub mod cvc5_backend;
pub mod process;
pub mod smtlib_printer;
pub mod sygus_backend;
pub mod z3_backend;
