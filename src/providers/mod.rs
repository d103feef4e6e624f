pub mod sl;
