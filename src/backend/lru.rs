//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于双向链表 + 哈希表的 LRU 存储，get/insert/evict 均为 O(1)。

use ahash::AHashMap;

/// 链表节点，存放在槽位数组中，通过下标互相引用
struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU 存储
///
/// 头部为最近使用的条目，尾部为最久未使用的条目。
/// 节点保存在 `slots` 中，删除后的槽位进入空闲列表复用。
pub struct LruStore<V> {
    map: AHashMap<String, usize>,
    slots: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl<V> LruStore<V> {
    /// 创建新的 LRU 存储
    ///
    /// # 参数
    ///
    /// * `capacity` - 最大条目数，0 会被视为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: AHashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// 获取条目并将其移动到最近使用位置
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        let idx = *self.map.get(key)?;
        self.detach(idx);
        self.attach_front(idx);
        self.slots[idx].as_mut().map(|node| &mut node.value)
    }

    /// 读取条目但不改变其使用顺序
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.slots[idx].as_ref().map(|node| &node.value)
    }

    /// 插入或替换条目
    ///
    /// 新键在容量已满时会先淘汰最久未使用的条目，并将其返回；
    /// 替换已有键不会触发淘汰。
    pub fn insert(&mut self, key: String, value: V) -> Option<(String, V)> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = self.slots[idx].as_mut() {
                node.value = value;
            }
            self.detach(idx);
            self.attach_front(idx);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.attach_front(idx);
        evicted
    }

    /// 删除指定条目
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        self.free.push(idx);
        self.slots[idx].take().map(|node| node.value)
    }

    /// 弹出最久未使用的条目
    pub fn pop_lru(&mut self) -> Option<(String, V)> {
        let idx = self.tail?;
        self.detach(idx);
        self.free.push(idx);
        let node = self.slots[idx].take()?;
        self.map.remove(&node.key);
        Some((node.key, node.value))
    }

    /// 所有键（无序）
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    /// 按从最近到最久的顺序遍历条目
    pub fn iter(&self) -> LruIter<'_, V> {
        LruIter {
            store: self,
            cursor: self.head,
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(node) = self.slots[p].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.slots[n].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.slots[idx].as_mut() {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.slots[h].as_mut() {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}

/// 从最近使用到最久未使用的迭代器
pub struct LruIter<'a, V> {
    store: &'a LruStore<V>,
    cursor: Option<usize>,
}

impl<'a, V> Iterator for LruIter<'a, V> {
    type Item = (&'a String, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.store.slots[idx].as_ref()?;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}
