pub mod fs_json_util;
