//! 主题与订阅过滤器

/// 过滤器是否含有通配符
pub fn filter_has_wildcards(filter: &str) -> bool {
    filter.contains('+') || filter.contains('#')
}

pub fn valid_publish_topic(topic: &str) -> bool {
    !topic.is_empty() && !filter_has_wildcards(topic)
}

pub fn valid_subscribe_filter(filter: &str) -> bool {
    // 不可以订阅空 filter
    if filter.is_empty() {
        return false;
    }

    let filters = filter.split('/').collect::<Vec<&str>>();
    if let Some((last, remaining)) = filters.split_last() {
        for entry in remaining.iter() {
            // # 字符只能在最后一位
            if entry.contains('#') {
                return false;
            }
            // + 字符必须独占一个层级
            if entry.len() != 1 && entry.contains('+') {
                return false;
            }
        }

        // 最后一位的 # 字符必须跟在 '/' 后面
        if last.len() != 1 && (last.contains('#') || last.contains('+')) {
            return false;
        }
    }

    true
}

/// 匹配发布消息使用的 topic 和 订阅的 filter
pub fn matches(topic: &str, filter: &str) -> bool {
    // 以 $ 开头的 topic 不能被首层通配符匹配，如 $SYS 只能被 $SYS/... 订阅
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut topics = topic.split('/');
    let filters = filter.split('/');

    for f in filters {
        // # 字符匹配所有子级
        if f == "#" {
            return true;
        }

        let top = topics.next();
        match top {
            // + 字符直接匹配这一层
            Some(_) if f == "+" => continue,
            // 没有通配符，必须完全匹配
            Some(t) if f != t => return false,
            Some(_) => continue,
            // topic 层级不够了
            None => return false,
        }
    }

    // filter 层级不够了
    topics.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_filter_validation() {
        assert!(valid_subscribe_filter("#"));
        assert!(valid_subscribe_filter("a/+/c"));
        assert!(valid_subscribe_filter("$SYS/brokers/+/stats/#"));
        assert!(!valid_subscribe_filter(""));
        assert!(!valid_subscribe_filter("a/#/c"));
        assert!(!valid_subscribe_filter("a/b#"));
        assert!(!valid_subscribe_filter("a/b+/c"));
    }

    #[test]
    fn wildcard_matching() {
        assert!(matches("a/b/c", "a/+/c"));
        assert!(matches("a/b/c", "a/#"));
        assert!(matches("a", "a/#"));
        assert!(!matches("a/b", "a/+/c"));
        assert!(!matches("a/b/c", "a/b"));
    }

    #[test]
    fn sys_topics_need_explicit_prefix() {
        let topic = "$SYS/brokers/emq@127.0.0.1/stats/clients/count";
        assert!(!matches(topic, "#"));
        assert!(!matches(topic, "+/brokers/#"));
        assert!(matches(topic, "$SYS/#"));
        assert!(matches(topic, "$SYS/brokers/+/stats/clients/count"));
    }
}
