mod cli;
mod explorer;
mod session;
