mod bitrate_table;
mod concurrent_downloads;
mod monitor_lifecycle;
