pub mod debayer;
